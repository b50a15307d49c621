//! One coupled time step of the ice dynamics core
//!
//! The stress balance runs first on the current geometry and hardness. Its
//! 3D velocity and strain heating then drive the enthalpy step and, when
//! enabled, the age step. The basal melt rate of the previous step sets the
//! basal vertical velocity.

use crate::config::Config;
use crate::energy::{AgeModel, CellType, EnergyInputs, EnergyStats, EnthalpyModel};
use crate::error::{ConfigError, Result};
use crate::grid::{Array2, Array3, HorizontalGrid, VerticalGrid};
use crate::stressbalance::{Blatter, SolveStats, StressBalanceInputs};

/// Bed, ice thickness and sea level (m)
#[derive(Debug, Clone)]
pub struct Geometry {
    pub bed: Array2<f64>,
    pub thickness: Array2<f64>,
    pub sea_level: Array2<f64>,
}

impl Geometry {
    /// Grounded, floating or ice-free by flotation
    pub fn cell_type(&self, config: &Config) -> Array2<CellType> {
        let c = &config.constants;
        Array2::from_fn(self.thickness.mx(), self.thickness.my(), |i, j| {
            CellType::from_geometry(
                *self.bed.get(i, j),
                *self.thickness.get(i, j),
                *self.sea_level.get(i, j),
                c.ice_density,
                c.sea_water_density,
            )
        })
    }
}

/// Fields supplied by the surface, ocean, hydrology and bed models
#[derive(Debug, Clone)]
pub struct BoundaryData {
    /// Ice surface temperature (K)
    pub surface_temperature: Array2<f64>,
    pub surface_liquid_fraction: Array2<f64>,
    /// Temperature at the base of ice shelves (K)
    pub shelf_base_temperature: Array2<f64>,
    /// Geothermal flux (W/m²)
    pub geothermal_flux: Array2<f64>,
    /// Basal frictional heating (W/m²)
    pub frictional_heating: Array2<f64>,
    /// Till water thickness (m)
    pub till_water_thickness: Array2<f64>,
    /// Basal yield stress (Pa)
    pub tauc: Array2<f64>,
    /// Columns with prescribed (zero) velocity
    pub bc_mask: Array2<bool>,
}

impl BoundaryData {
    /// Uniform surface temperature, melting shelf bases, no heat or water
    /// at the base and no sliding
    pub fn uniform(grid: &HorizontalGrid, config: &Config, surface_temperature: f64) -> Self {
        let (mx, my) = (grid.mx, grid.my);
        Self {
            surface_temperature: Array2::filled(mx, my, surface_temperature),
            surface_liquid_fraction: Array2::filled(mx, my, 0.0),
            shelf_base_temperature: Array2::filled(mx, my, config.constants.melting_point),
            geothermal_flux: Array2::filled(mx, my, 0.0),
            frictional_heating: Array2::filled(mx, my, 0.0),
            till_water_thickness: Array2::filled(mx, my, 0.0),
            tauc: Array2::filled(mx, my, 0.0),
            bc_mask: Array2::filled(mx, my, false),
        }
    }
}

/// Diagnostics of one coupled step
#[derive(Debug, Clone, Default)]
pub struct StepStats {
    pub stress_balance: SolveStats,
    pub energy: EnergyStats,
}

/// Stress balance, enthalpy and age of one ice sheet
pub struct IceModel {
    config: Config,
    grid: HorizontalGrid,
    pub geometry: Geometry,
    pub boundary: BoundaryData,
    /// Ice hardness on the storage grid
    pub hardness: Array3<f64>,
    blatter: Blatter,
    enthalpy: EnthalpyModel,
    age: Option<AgeModel>,
    time: f64,
}

impl IceModel {
    /// Build the solvers and start from isothermal hardness and an enthalpy
    /// field at the surface temperature of each column
    pub fn new(
        config: &Config,
        grid: &HorizontalGrid,
        vertical: &VerticalGrid,
        geometry: Geometry,
        boundary: BoundaryData,
    ) -> Result<Self> {
        config.validate()?;
        let n2 = grid.n_points();
        for (name, actual) in [
            ("bed", geometry.bed.len()),
            ("thickness", geometry.thickness.len()),
            ("sea_level", geometry.sea_level.len()),
            ("surface_temperature", boundary.surface_temperature.len()),
            ("surface_liquid_fraction", boundary.surface_liquid_fraction.len()),
            ("shelf_base_temperature", boundary.shelf_base_temperature.len()),
            ("geothermal_flux", boundary.geothermal_flux.len()),
            ("frictional_heating", boundary.frictional_heating.len()),
            ("till_water_thickness", boundary.till_water_thickness.len()),
            ("tauc", boundary.tauc.len()),
            ("bc_mask", boundary.bc_mask.len()),
        ] {
            if actual != n2 {
                return Err(ConfigError::SizeMismatch { name, expected: n2, actual }.into());
            }
        }

        let blatter = Blatter::new(config, grid, vertical)?;
        let mut enthalpy = EnthalpyModel::new(config, grid, vertical)?;
        let age = if config.energy.age_enabled {
            Some(AgeModel::new(config, grid, vertical)?)
        } else {
            None
        };

        let ec = enthalpy.converter().clone();
        let levels = vertical.levels();
        let initial = Array3::from_fn(grid.mx, grid.my, vertical.mz(), |i, j, k| {
            let depth = (*geometry.thickness.get(i, j) - levels[k]).max(0.0);
            ec.enthalpy_permissive(*boundary.surface_temperature.get(i, j), 0.0, ec.pressure(depth))
        });
        enthalpy.set_enthalpy(initial)?;

        let hardness = Array3::filled(
            grid.mx,
            grid.my,
            vertical.mz(),
            config.stress_balance.isothermal_hardness(),
        );

        Ok(Self {
            config: config.clone(),
            grid: grid.clone(),
            geometry,
            boundary,
            hardness,
            blatter,
            enthalpy,
            age,
            time: 0.0,
        })
    }

    pub fn grid(&self) -> &HorizontalGrid {
        &self.grid
    }

    /// Model time (s)
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stress_balance(&self) -> &Blatter {
        &self.blatter
    }

    pub fn enthalpy(&self) -> &EnthalpyModel {
        &self.enthalpy
    }

    pub fn enthalpy_mut(&mut self) -> &mut EnthalpyModel {
        &mut self.enthalpy
    }

    pub fn age(&self) -> Option<&AgeModel> {
        self.age.as_ref()
    }

    /// Advance by `dt` seconds
    ///
    /// On error the model is left in the state reached so far.
    pub fn step(&mut self, dt: f64) -> Result<StepStats> {
        let geometry = &self.geometry;
        let boundary = &self.boundary;

        let stress_balance = self.blatter.update(&StressBalanceInputs {
            bed: Some(&geometry.bed),
            thickness: Some(&geometry.thickness),
            sea_level: Some(&geometry.sea_level),
            hardness: Some(&self.hardness),
            tauc: Some(&boundary.tauc),
            bc_mask: Some(&boundary.bc_mask),
            basal_melt_rate: Some(self.enthalpy.basal_melt_rate()),
        })?;

        let velocity = self.blatter.velocity3d();
        let cell_type = geometry.cell_type(&self.config);
        let energy = self.enthalpy.update(
            &EnergyInputs {
                thickness: Some(&geometry.thickness),
                cell_type: Some(&cell_type),
                surface_temperature: Some(&boundary.surface_temperature),
                surface_liquid_fraction: Some(&boundary.surface_liquid_fraction),
                shelf_base_temperature: Some(&boundary.shelf_base_temperature),
                geothermal_flux: Some(&boundary.geothermal_flux),
                frictional_heating: Some(&boundary.frictional_heating),
                till_water_thickness: Some(&boundary.till_water_thickness),
                u: Some(&velocity.u),
                v: Some(&velocity.v),
                w: Some(&velocity.w),
                strain_heating: Some(self.blatter.strain_heating()),
            },
            dt,
        )?;

        if let Some(age) = self.age.as_mut() {
            age.update(&geometry.thickness, &velocity.u, &velocity.v, &velocity.w, dt)?;
        }

        self.time += dt;
        log::info!(
            "step to t = {:.3e} s: {} multigrid cycles, {} icy columns",
            self.time,
            stress_balance.cycles,
            energy.icy_columns
        );
        Ok(StepStats { stress_balance, energy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(config: &Config) -> (HorizontalGrid, VerticalGrid, Geometry, BoundaryData) {
        let grid = HorizontalGrid::from_bounds(6, 5, [0.0, 5000.0], [0.0, 4000.0]).unwrap();
        let vertical = VerticalGrid::equal(1000.0, 11).unwrap();
        let geometry = Geometry {
            bed: Array2::filled(6, 5, 0.0),
            thickness: Array2::filled(6, 5, 500.0),
            sea_level: Array2::filled(6, 5, -1000.0),
        };
        let boundary = BoundaryData::uniform(&grid, config, 250.0);
        (grid, vertical, geometry, boundary)
    }

    #[test]
    fn test_cell_type_from_geometry() {
        let config = Config::default();
        let geometry = Geometry {
            bed: Array2::from_fn(3, 1, |i, _| [-1000.0, 0.0, 0.0][i]),
            thickness: Array2::from_fn(3, 1, |i, _| [200.0, 200.0, 0.0][i]),
            sea_level: Array2::filled(3, 1, 0.0),
        };
        let ct = geometry.cell_type(&config);
        assert_eq!(*ct.get(0, 0), CellType::Floating);
        assert_eq!(*ct.get(1, 0), CellType::Grounded);
        assert_eq!(*ct.get(2, 0), CellType::IceFree);
    }

    #[test]
    fn test_mismatched_boundary_data_is_rejected() {
        let config = Config::default();
        let (grid, vertical, geometry, mut boundary) = slab(&config);
        boundary.tauc = Array2::filled(2, 2, 0.0);
        let err = IceModel::new(&config, &grid, &vertical, geometry, boundary).err().unwrap();
        assert!(err.to_string().contains("tauc"));
    }

    #[test]
    fn test_flat_slab_step_keeps_cold_column() {
        let mut config = Config::default();
        config.energy.age_enabled = true;
        let (grid, vertical, geometry, boundary) = slab(&config);
        let mut model = IceModel::new(&config, &grid, &vertical, geometry, boundary).unwrap();

        let dt = 1.0e7;
        let stats = model.step(dt).unwrap();
        assert!(stats.stress_balance.converged);
        assert_eq!(stats.energy.icy_columns, 30);
        assert_eq!(model.time(), dt);

        // flat, motionless, uniform-temperature ice with no basal heat stays put
        let temperature = model.enthalpy().temperature(&model.geometry.thickness);
        for k in 0..=5 {
            assert!((temperature[(2, 2, k)] - 250.0).abs() < 1e-6);
        }
        assert!(model.enthalpy().basal_melt_rate().iter().all(|&m| m == 0.0));

        let age = model.age().unwrap().age();
        assert!((age[(2, 2, 0)] - dt).abs() < 1e-6 * dt);
    }
}
