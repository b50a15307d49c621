use glacier_sim::utils::units::{
    celsius_to_kelvin, kelvin_to_celsius, m_per_s_to_m_per_year, melt_rate_to_mm_per_year, seconds_to_years,
    years_to_seconds,
};
use glacier_sim::{Array2, BoundaryData, Config, Geometry, HorizontalGrid, IceModel, VerticalGrid};

fn main() {
    if let Err(e) = run() {
        eprintln!("slab_demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> glacier_sim::Result<()> {
    println!("=== Inclined Slab Demo ===\n");

    // Problem setup: 500 m thick slab frozen to a bed sloping 0.1% in x,
    // held in place at both ends of the domain.
    //
    // Domain: 20 x 10 km, 17 x 9 grid points
    // Surface: -10 C, geothermal flux 0.042 W/m²

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => {
            let mut config = Config::default();
            config.stress_balance.n_levels = 3;
            config.stress_balance.mz = 9;
            config.energy.age_enabled = true;
            config
        }
    };
    config.validate()?;
    config.log_summary();

    let (mx, my) = (17, 9);
    let grid = HorizontalGrid::from_bounds(mx, my, [0.0, 20e3], [0.0, 10e3])?;
    let vertical = VerticalGrid::equal(1000.0, 21)?;

    let slope = 1e-3;
    let geometry = Geometry {
        bed: Array2::from_fn(mx, my, |i, _| -slope * grid.x(i)),
        thickness: Array2::filled(mx, my, 500.0),
        sea_level: Array2::filled(mx, my, -2000.0),
    };

    let mut boundary = BoundaryData::uniform(&grid, &config, celsius_to_kelvin(-10.0));
    boundary.geothermal_flux.set_all(0.042);
    for j in 0..my {
        *boundary.bc_mask.get_mut(0, j) = true;
        *boundary.bc_mask.get_mut(mx - 1, j) = true;
    }

    println!("Grid: {} x {} x {} levels", mx, my, vertical.mz());
    let mut model = IceModel::new(&config, &grid, &vertical, geometry, boundary)?;

    let dt = years_to_seconds(10.0);
    for step in 1..=5 {
        let stats = model.step(dt)?;
        let u = &model.stress_balance().velocity3d().u;
        let u_max = u.iter().fold(0.0_f64, |a, &b| a.max(b.abs()));
        let melt = model.enthalpy().basal_melt_rate();
        let melt_max = melt.iter().fold(0.0_f64, |a, &b| a.max(b));
        println!(
            "step {:2}: t = {:6.1} yr, {:2} MG cycles, max |u| = {:8.3} m/yr, max melt = {:.3} mm/yr, bulge {}",
            step,
            seconds_to_years(model.time()),
            stats.stress_balance.cycles,
            m_per_s_to_m_per_year(u_max),
            melt_rate_to_mm_per_year(melt_max),
            stats.energy.bulge_count
        );
    }

    let temperature = model.enthalpy().temperature(&model.geometry.thickness);
    let (ic, jc) = (mx / 2, my / 2);
    println!("\nTemperature profile at the center column:");
    for (k, z) in vertical.levels().iter().enumerate().filter(|(_, z)| **z <= 500.0).step_by(2) {
        println!("  z = {:6.1} m: T = {:7.3} C", z, kelvin_to_celsius(temperature[(ic, jc, k)]));
    }
    if let Some(age) = model.age() {
        println!("\nBasal age at the center: {:.1} yr", seconds_to_years(age.age()[(ic, jc, 0)]));
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
