//! Blatter-Pattyn stress balance driver
//!
//! Owns the padded multigrid hierarchy and the sigma-grid velocity iterate.
//! Each `update` copies the model geometry onto the finest level, restricts
//! it down the hierarchy, solves, and resamples the result onto the storage
//! grid of the 3D model fields.

use nalgebra::Vector2;
use rayon::prelude::*;

use super::assembly::{zero_velocity, BlatterAssembler, VelocityField};
use super::forcing::{BoundaryForcing, NoForcing};
use super::multigrid::{MultigridSolver, SolveStats};
use crate::config::{Config, StressBalanceConfig};
use crate::error::{ConfigError, Result};
use crate::grid::{
    grid_padding, Array2, Array3, Decomposition, GridHierarchy, GridLevel, HorizontalGrid, VerticalGrid,
};
use crate::physics::flow_law::{flow_law_from_name, FlowLaw};

/// Geometry and material inputs of one stress-balance solve
///
/// Fields marked required must be set before `Blatter::update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StressBalanceInputs<'a> {
    /// Bed elevation (required)
    pub bed: Option<&'a Array2<f64>>,
    /// Ice thickness (required)
    pub thickness: Option<&'a Array2<f64>>,
    /// Sea level elevation (required)
    pub sea_level: Option<&'a Array2<f64>>,
    /// Ice hardness on the storage grid (required)
    pub hardness: Option<&'a Array3<f64>>,
    /// Basal yield stress; zero when absent
    pub tauc: Option<&'a Array2<f64>>,
    /// Columns with prescribed velocity; none when absent
    pub bc_mask: Option<&'a Array2<bool>>,
    /// Basal melt rate (m/s) used as the base value of `w`; zero when absent
    pub basal_melt_rate: Option<&'a Array2<f64>>,
}

fn required<'a, T>(field: Option<&'a T>, name: &'static str) -> std::result::Result<&'a T, ConfigError> {
    field.ok_or(ConfigError::MissingInput(name))
}

fn check_size(name: &'static str, expected: usize, actual: usize) -> std::result::Result<(), ConfigError> {
    if expected != actual {
        return Err(ConfigError::SizeMismatch { name, expected, actual });
    }
    Ok(())
}

/// 3D velocity on the storage grid
#[derive(Debug, Clone)]
pub struct Velocity3d {
    pub u: Array3<f64>,
    pub v: Array3<f64>,
    /// Vertical velocity relative to the ice base
    pub w: Array3<f64>,
}

impl Velocity3d {
    fn zeros(mx: usize, my: usize, mz: usize) -> Self {
        Self {
            u: Array3::filled(mx, my, mz, 0.0),
            v: Array3::filled(mx, my, mz, 0.0),
            w: Array3::filled(mx, my, mz, 0.0),
        }
    }
}

/// First-order stress balance on a padded terrain-following grid
pub struct Blatter {
    config: StressBalanceConfig,
    grid: HorizontalGrid,
    vertical: VerticalGrid,
    rho_g: f64,
    flow_law: Box<dyn FlowLaw>,
    forcing: Box<dyn BoundaryForcing>,
    hierarchy: GridHierarchy,
    /// Sigma-grid velocity; the initial guess of the next solve
    velocity: VelocityField,
    velocity3d: Velocity3d,
    strain_heating: Array3<f64>,
}

impl Blatter {
    /// Set up the hierarchy for the model grid, with the flow law named in
    /// the configuration and no extra forcing
    pub fn new(config: &Config, grid: &HorizontalGrid, vertical: &VerticalGrid) -> Result<Self> {
        let sb = &config.stress_balance;
        let flow_law = flow_law_from_name(&sb.flow_law, sb)?;
        Self::with_flow_law(config, grid, vertical, flow_law)
    }

    pub fn with_flow_law(
        config: &Config,
        grid: &HorizontalGrid,
        vertical: &VerticalGrid,
        flow_law: Box<dyn FlowLaw>,
    ) -> Result<Self> {
        config.validate()?;
        let sb = config.stress_balance.clone();
        let n_levels = sb.n_levels;

        let mx = grid.mx + grid_padding(grid.mx, n_levels);
        let my = grid.my + grid_padding(grid.my, n_levels);
        let mz = sb.mz + grid_padding(sb.mz, n_levels);
        let decomposition =
            Decomposition::new(mx, my, sb.partitions[0], sb.partitions[1], sb.stencil_width)?;
        let finest = GridLevel::new(
            mx,
            my,
            mz,
            grid.x_min,
            grid.y_min,
            grid.dx,
            grid.dy,
            sb.min_thickness,
            decomposition,
        )?;
        let hierarchy = GridHierarchy::new(finest, n_levels)?;
        log::info!(
            "Blatter grid: {} x {} x {} (padded from {} x {} x {}), {} levels",
            mx,
            my,
            mz,
            grid.mx,
            grid.my,
            sb.mz,
            hierarchy.n_levels()
        );

        let velocity = zero_velocity(hierarchy.finest());
        let storage_mz = vertical.mz();
        Ok(Self {
            rho_g: config.constants.ice_density * config.constants.standard_gravity,
            flow_law,
            forcing: Box::new(NoForcing),
            velocity,
            velocity3d: Velocity3d::zeros(grid.mx, grid.my, storage_mz),
            strain_heating: Array3::filled(grid.mx, grid.my, storage_mz, 0.0),
            hierarchy,
            grid: grid.clone(),
            vertical: vertical.clone(),
            config: sb,
        })
    }

    /// Replace the (default zero) boundary forcing
    pub fn with_forcing(mut self, forcing: Box<dyn BoundaryForcing>) -> Self {
        self.forcing = forcing;
        self
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    /// Velocity on the padded sigma grid
    pub fn sigma_velocity(&self) -> &VelocityField {
        &self.velocity
    }

    pub fn velocity3d(&self) -> &Velocity3d {
        &self.velocity3d
    }

    /// Strain heating (W/m³) on the storage grid
    pub fn strain_heating(&self) -> &Array3<f64> {
        &self.strain_heating
    }

    /// Solve for the velocity with the current geometry
    pub fn update(&mut self, inputs: &StressBalanceInputs) -> Result<SolveStats> {
        self.set_parameters(inputs)?;

        let assembler = BlatterAssembler::new(self.flow_law.as_ref(), self.forcing.as_ref(), self.rho_g);
        let solver = MultigridSolver::new(&assembler, &self.config)?;
        let stats = solver.solve(&self.hierarchy, &mut self.velocity)?;

        let heating = assembler.strain_heating(self.hierarchy.finest(), &self.velocity);
        let thickness = required(inputs.thickness, "thickness")?;
        self.resample(thickness, &heating);
        self.velocity3d.w = vertical_velocity(
            &self.grid,
            &self.vertical,
            &self.velocity3d.u,
            &self.velocity3d.v,
            thickness,
            inputs.basal_melt_rate,
            self.config.min_thickness,
        );
        Ok(stats)
    }

    /// Copy inputs onto the finest level and restrict them down
    ///
    /// The padding area continues the geometry of the nearest domain column
    /// so that padding does not create an ice cliff at the domain edge.
    fn set_parameters(&mut self, inputs: &StressBalanceInputs) -> std::result::Result<(), ConfigError> {
        let bed = required(inputs.bed, "bed")?;
        let thickness = required(inputs.thickness, "thickness")?;
        let sea_level = required(inputs.sea_level, "sea_level")?;
        let hardness = required(inputs.hardness, "hardness")?;

        let n2 = self.grid.n_points();
        check_size("bed", n2, bed.len())?;
        check_size("thickness", n2, thickness.len())?;
        check_size("sea_level", n2, sea_level.len())?;
        check_size("hardness", n2 * self.vertical.mz(), hardness.len())?;
        if let Some(tauc) = inputs.tauc {
            check_size("tauc", n2, tauc.len())?;
        }
        if let Some(mask) = inputs.bc_mask {
            check_size("bc_mask", n2, mask.len())?;
        }
        if let Some(melt) = inputs.basal_melt_rate {
            check_size("basal_melt_rate", n2, melt.len())?;
        }

        let (mx, my) = (self.grid.mx, self.grid.my);
        let levels = self.vertical.levels();
        let fine = self.hierarchy.finest_mut();
        let mz = fine.mz;
        for j in 0..fine.my {
            for i in 0..fine.mx {
                let (ci, cj) = (i.min(mx - 1), j.min(my - 1));
                let h = *thickness.get(ci, cj);

                let p = fine.params.get_mut(i, j);
                p.bed = *bed.get(ci, cj);
                p.thickness = h;
                p.sea_level = *sea_level.get(ci, cj);
                p.tauc = inputs.tauc.map_or(0.0, |t| *t.get(ci, cj));
                p.bc_mask = inputs.bc_mask.is_some_and(|m| *m.get(ci, cj));

                let column = hardness.column(ci, cj);
                for k in 0..mz {
                    let z = h * k as f64 / (mz - 1) as f64;
                    *fine.hardness.get_mut(i, j, k) = interpolate_column(levels, column, z);
                }
            }
        }

        self.hierarchy.restrict_parameters();
        Ok(())
    }

    /// Sample sigma-grid velocity and strain heating at storage heights
    ///
    /// Velocity above the surface is the surface velocity; heating there
    /// is zero. Ice-free columns get zeros.
    fn resample(&mut self, thickness: &Array2<f64>, heating: &Array3<f64>) {
        let mx = self.grid.mx;
        let storage_mz = self.vertical.mz();
        let levels = self.vertical.levels();
        let sigma_mz = self.hierarchy.finest().mz;
        let min_thickness = self.config.min_thickness;
        let velocity = &self.velocity;

        let sample = |idx: usize, k: usize| -> Option<(Vector2<f64>, f64)> {
            let (i, j) = (idx % mx, idx / mx);
            let h = *thickness.get(i, j);
            if h < min_thickness {
                return None;
            }
            let z = levels[k];
            if z >= h {
                return Some((velocity[(i, j, sigma_mz - 1)], 0.0));
            }
            let s = z / h * (sigma_mz - 1) as f64;
            let k0 = (s.floor() as usize).min(sigma_mz - 2);
            let w = s - k0 as f64;
            let u = velocity[(i, j, k0)] * (1.0 - w) + velocity[(i, j, k0 + 1)] * w;
            let sigma = heating[(i, j, k0)] * (1.0 - w) + heating[(i, j, k0 + 1)] * w;
            Some((u, sigma))
        };

        let out = &mut self.velocity3d;
        out.u
            .as_mut_slice()
            .par_chunks_mut(storage_mz)
            .zip(out.v.as_mut_slice().par_chunks_mut(storage_mz))
            .zip(self.strain_heating.as_mut_slice().par_chunks_mut(storage_mz))
            .enumerate()
            .for_each(|(idx, ((u, v), sigma))| {
                for k in 0..storage_mz {
                    let (vel, heat) = sample(idx, k).unwrap_or((Vector2::zeros(), 0.0));
                    u[k] = vel.x;
                    v[k] = vel.y;
                    sigma[k] = heat;
                }
            });
    }
}

/// Linear interpolation of a storage column at height `z` above the base
fn interpolate_column(levels: &[f64], column: &[f64], z: f64) -> f64 {
    let last = levels.len() - 1;
    let k = levels.partition_point(|&level| level <= z).saturating_sub(1);
    if k >= last {
        return column[last];
    }
    let w = ((z - levels[k]) / (levels[k + 1] - levels[k])).clamp(0.0, 1.0);
    (1.0 - w) * column[k] + w * column[k + 1]
}

/// Vertical velocity from incompressibility
///
/// `w(z) = w_b - ∫₀ᶻ (u_x + v_y) dz'` with `w_b = -basal melt rate`,
/// horizontal derivatives taken at fixed height above the base (centered,
/// one-sided at the domain edge) and the integral by the trapezoid rule.
/// Ice-free columns get zero.
pub fn vertical_velocity(
    grid: &HorizontalGrid,
    vertical: &VerticalGrid,
    u: &Array3<f64>,
    v: &Array3<f64>,
    thickness: &Array2<f64>,
    basal_melt_rate: Option<&Array2<f64>>,
    min_thickness: f64,
) -> Array3<f64> {
    let (mx, my, mz) = (grid.mx, grid.my, vertical.mz());
    let levels = vertical.levels();
    let mut w = Array3::filled(mx, my, mz, 0.0);

    let divergence = |i: usize, j: usize, k: usize| -> f64 {
        let (im, ip) = (i.saturating_sub(1), (i + 1).min(mx - 1));
        let (jm, jp) = (j.saturating_sub(1), (j + 1).min(my - 1));
        let u_x = (u[(ip, j, k)] - u[(im, j, k)]) / ((ip - im) as f64 * grid.dx);
        let v_y = (v[(i, jp, k)] - v[(i, jm, k)]) / ((jp - jm) as f64 * grid.dy);
        u_x + v_y
    };

    w.as_mut_slice()
        .par_chunks_mut(mz)
        .enumerate()
        .for_each(|(idx, column)| {
            let (i, j) = (idx % mx, idx / mx);
            if *thickness.get(i, j) < min_thickness {
                return;
            }
            column[0] = -basal_melt_rate.map_or(0.0, |m| *m.get(i, j));
            let mut div_below = divergence(i, j, 0);
            for k in 1..mz {
                let div = divergence(i, j, k);
                column[k] = column[k - 1] - 0.5 * (div + div_below) * (levels[k] - levels[k - 1]);
                div_below = div;
            }
        });
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::flow_law::NewtonianFlowLaw;
    use approx::assert_relative_eq;

    fn setup(n_levels: usize) -> (Config, HorizontalGrid, VerticalGrid) {
        let mut config = Config::default();
        config.stress_balance.n_levels = n_levels;
        config.stress_balance.mz = 5;
        config.stress_balance.atol = 1e-14;
        let grid = HorizontalGrid::from_bounds(8, 5, [0.0, 7000.0], [0.0, 4000.0]).unwrap();
        let vertical = VerticalGrid::equal(1000.0, 11).unwrap();
        (config, grid, vertical)
    }

    #[test]
    fn test_padding_makes_grid_coarsenable() {
        let (config, grid, vertical) = setup(3);
        let blatter = Blatter::new(&config, &grid, &vertical).unwrap();
        let fine = blatter.hierarchy().finest();
        assert_eq!((fine.mx, fine.my, fine.mz), (9, 5, 5));
        assert_eq!(blatter.hierarchy().n_levels(), 3);
        assert_eq!(blatter.hierarchy().level(2).dims(), (3, 2, 2));
    }

    #[test]
    fn test_missing_input_is_reported() {
        let (config, grid, vertical) = setup(2);
        let mut blatter = Blatter::new(&config, &grid, &vertical).unwrap();
        let thickness = Array2::filled(grid.mx, grid.my, 500.0);
        let inputs = StressBalanceInputs {
            thickness: Some(&thickness),
            ..Default::default()
        };
        let err = blatter.update(&inputs).unwrap_err();
        assert!(err.to_string().contains("bed"));
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let (config, grid, vertical) = setup(2);
        let mut blatter = Blatter::new(&config, &grid, &vertical).unwrap();
        let bed = Array2::filled(3, 3, 0.0);
        let field = Array2::filled(grid.mx, grid.my, 0.0);
        let hardness = Array3::filled(grid.mx, grid.my, vertical.mz(), 1e8);
        let inputs = StressBalanceInputs {
            bed: Some(&bed),
            thickness: Some(&field),
            sea_level: Some(&field),
            hardness: Some(&hardness),
            ..Default::default()
        };
        assert!(blatter.update(&inputs).is_err());
    }

    #[test]
    fn test_flat_slab_gives_zero_velocity() {
        let (config, grid, vertical) = setup(2);
        let mut blatter =
            Blatter::with_flow_law(&config, &grid, &vertical, Box::new(NewtonianFlowLaw)).unwrap();
        let bed = Array2::filled(grid.mx, grid.my, 0.0);
        let thickness = Array2::filled(grid.mx, grid.my, 500.0);
        let sea_level = Array2::filled(grid.mx, grid.my, -1000.0);
        let hardness = Array3::filled(grid.mx, grid.my, vertical.mz(), 1e13);
        let inputs = StressBalanceInputs {
            bed: Some(&bed),
            thickness: Some(&thickness),
            sea_level: Some(&sea_level),
            hardness: Some(&hardness),
            ..Default::default()
        };
        let stats = blatter.update(&inputs).unwrap();
        assert!(stats.converged);
        assert!(blatter.velocity3d().u.iter().all(|&x| x == 0.0));
        assert!(blatter.velocity3d().w.iter().all(|&x| x == 0.0));
        assert!(blatter.strain_heating().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_interpolate_column() {
        let levels = [0.0, 10.0, 30.0];
        let column = [1.0, 2.0, 4.0];
        assert_relative_eq!(interpolate_column(&levels, &column, 5.0), 1.5);
        assert_relative_eq!(interpolate_column(&levels, &column, 20.0), 3.0);
        assert_relative_eq!(interpolate_column(&levels, &column, 50.0), 4.0);
    }

    #[test]
    fn test_vertical_velocity_of_linear_stretching() {
        let grid = HorizontalGrid::from_bounds(5, 4, [0.0, 400.0], [0.0, 300.0]).unwrap();
        let vertical = VerticalGrid::new(vec![0.0, 10.0, 50.0, 100.0]).unwrap();
        let a = 1e-3;
        let u = Array3::from_fn(5, 4, 4, |i, _, _| a * grid.x(i));
        let v = Array3::filled(5, 4, 4, 0.0);
        let thickness = Array2::filled(5, 4, 100.0);
        let melt = Array2::filled(5, 4, 0.01);
        let w = vertical_velocity(&grid, &vertical, &u, &v, &thickness, Some(&melt), 0.1);
        for j in 0..4 {
            for i in 0..5 {
                for (k, z) in vertical.levels().iter().enumerate() {
                    assert_relative_eq!(w[(i, j, k)], -0.01 - a * z, epsilon = 1e-12);
                }
            }
        }
    }
}
