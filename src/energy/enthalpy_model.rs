//! Enthalpy time step of the whole ice sheet
//!
//! Columns are independent within a step. Each patch of the decomposition
//! reads a ghosted copy of the old enthalpy (for horizontal advection),
//! solves its owned columns on the fine vertical grid and writes the new
//! enthalpy and basal melt rate back for its owned columns only.

use std::sync::Arc;

use rayon::prelude::*;

use super::column::{BasalBoundary, ColumnMaterial, EnthalpyColumn};
use super::inputs::{CellType, EnergyFields, EnergyInputs};
use super::postprocess::{BaseState, ColumnPostProcessor};
use crate::config::Config;
use crate::error::{ConfigError, EnergyError, Result};
use crate::grid::{
    Array2, Array3, Decomposition, HorizontalGrid, LocalArray2, LocalArray3, Patch, VerticalGrid, VerticalMapping,
};
use crate::physics::enthalpy::{enthalpy_converter_from_name, Conductivity, EnthalpyConverter};

/// Diagnostic counters of one enthalpy step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyStats {
    /// Levels capped at the liquid limit
    pub liquified_count: usize,
    /// Volume of the capped fine-grid cells (m³)
    pub liquified_volume: f64,
    /// Levels raised by the cold bulge limiter
    pub bulge_count: usize,
    /// Columns whose vertical advection was partly upwinded
    pub reduced_accuracy_count: usize,
    /// Columns with ice (`ks > 0`)
    pub icy_columns: usize,
}

impl EnergyStats {
    fn merge(&mut self, other: &EnergyStats) {
        self.liquified_count += other.liquified_count;
        self.bulge_count += other.bulge_count;
        self.reduced_accuracy_count += other.reduced_accuracy_count;
        self.icy_columns += other.icy_columns;
    }
}

/// First-order upwind difference `vel ∂E/∂x`
#[inline]
pub(crate) fn upwind(vel: f64, minus: f64, center: f64, plus: f64, dx: f64) -> f64 {
    if vel < 0.0 {
        vel * (plus - center) / dx
    } else {
        vel * (center - minus) / dx
    }
}

/// Work arrays of one patch
struct ColumnBuffers {
    column: EnthalpyColumn,
    u: Vec<f64>,
    v: Vec<f64>,
    west: Vec<f64>,
    east: Vec<f64>,
    south: Vec<f64>,
    north: Vec<f64>,
    x: Vec<f64>,
}

struct PatchResult {
    enthalpy: LocalArray3<f64>,
    melt: LocalArray2<f64>,
    stats: EnergyStats,
}

/// Enthalpy field, basal melt rate and the column solver that updates them
pub struct EnthalpyModel {
    grid: HorizontalGrid,
    decomposition: Decomposition,
    mapping: VerticalMapping,
    ec: Arc<dyn EnthalpyConverter>,
    material: ColumnMaterial,
    post: ColumnPostProcessor,
    /// Enthalpy (J/kg) on the storage grid
    enthalpy: Array3<f64>,
    /// Basal melt rate (m/s, ice equivalent)
    basal_melt_rate: Array2<f64>,
}

impl EnthalpyModel {
    pub fn new(config: &Config, grid: &HorizontalGrid, vertical: &VerticalGrid) -> Result<Self> {
        config.validate()?;
        let ec = enthalpy_converter_from_name(&config.energy.converter, &config.constants)?;
        let sb = &config.stress_balance;
        let decomposition = grid.decomposition(sb.partitions, sb.stencil_width)?;
        let constants = &config.constants;
        let material = ColumnMaterial {
            density: constants.ice_density,
            specific_heat: constants.ice_specific_heat,
            conductivity: constants.ice_conductivity,
            conductivity_law: if config.energy.variable_conductivity {
                Conductivity::TemperatureDependent
            } else {
                Conductivity::Constant(constants.ice_conductivity)
            },
            temperate_ratio: config.energy.temperate_conductivity_ratio,
        };
        let mapping = VerticalMapping::new(vertical);
        log::debug!(
            "enthalpy columns: {} storage levels, {} fine levels (dz = {:.3} m)",
            vertical.mz(),
            mapping.fine_mz(),
            mapping.fine_dz()
        );

        Ok(Self {
            post: ColumnPostProcessor::new(ec.clone(), &config.energy, constants),
            enthalpy: Array3::filled(grid.mx, grid.my, vertical.mz(), 0.0),
            basal_melt_rate: Array2::filled(grid.mx, grid.my, 0.0),
            grid: grid.clone(),
            decomposition,
            mapping,
            ec,
            material,
        })
    }

    pub fn converter(&self) -> &Arc<dyn EnthalpyConverter> {
        &self.ec
    }

    pub fn mapping(&self) -> &VerticalMapping {
        &self.mapping
    }

    pub fn enthalpy(&self) -> &Array3<f64> {
        &self.enthalpy
    }

    pub fn basal_melt_rate(&self) -> &Array2<f64> {
        &self.basal_melt_rate
    }

    /// Replace the enthalpy field
    pub fn set_enthalpy(&mut self, enthalpy: Array3<f64>) -> std::result::Result<(), ConfigError> {
        if enthalpy.len() != self.enthalpy.len() {
            return Err(ConfigError::SizeMismatch {
                name: "enthalpy",
                expected: self.enthalpy.len(),
                actual: enthalpy.len(),
            });
        }
        self.enthalpy = enthalpy;
        Ok(())
    }

    /// Pressure at storage level `k` of a column of the given thickness
    fn storage_pressure(&self, thickness: f64, k: usize) -> f64 {
        self.ec.pressure(thickness - self.mapping.storage().levels()[k])
    }

    /// Initialize from temperature (K) and water fraction; fails on
    /// physically inconsistent states
    pub fn init_from_temperature(
        &mut self,
        temperature: &Array3<f64>,
        water_fraction: Option<&Array3<f64>>,
        thickness: &Array2<f64>,
    ) -> Result<()> {
        let n = self.enthalpy.len();
        if temperature.len() != n {
            return Err(ConfigError::SizeMismatch {
                name: "temperature",
                expected: n,
                actual: temperature.len(),
            }
            .into());
        }
        let mz = self.mapping.storage().mz();
        for j in 0..self.grid.my {
            for i in 0..self.grid.mx {
                let h = *thickness.get(i, j);
                for k in 0..mz {
                    let omega = water_fraction.map_or(0.0, |w| w[(i, j, k)]);
                    let p = self.storage_pressure(h, k);
                    self.enthalpy[(i, j, k)] = self.ec.enthalpy(temperature[(i, j, k)], omega, p)?;
                }
            }
        }
        Ok(())
    }

    /// Temperature (K) on the storage grid
    pub fn temperature(&self, thickness: &Array2<f64>) -> Array3<f64> {
        let mz = self.mapping.storage().mz();
        Array3::from_fn(self.grid.mx, self.grid.my, mz, |i, j, k| {
            let p = self.storage_pressure(*thickness.get(i, j), k);
            self.ec.temperature(self.enthalpy[(i, j, k)], p)
        })
    }

    /// Liquid water fraction on the storage grid
    pub fn water_fraction(&self, thickness: &Array2<f64>) -> Array3<f64> {
        let mz = self.mapping.storage().mz();
        Array3::from_fn(self.grid.mx, self.grid.my, mz, |i, j, k| {
            let p = self.storage_pressure(*thickness.get(i, j), k);
            self.ec.water_fraction(self.enthalpy[(i, j, k)], p)
        })
    }

    /// Advance the enthalpy by `dt` seconds and recompute the basal melt rate
    pub fn update(&mut self, inputs: &EnergyInputs, dt: f64) -> Result<EnergyStats> {
        if !(dt > 0.0) {
            return Err(ConfigError::invalid("dt", format!("time step must be positive, got {}", dt)).into());
        }
        let mz = self.mapping.storage().mz();
        let fields = inputs.check(self.grid.mx, self.grid.my, mz)?;

        let results = self
            .decomposition
            .patches()
            .par_iter()
            .map(|patch| self.update_patch(patch, &fields, dt))
            .collect::<std::result::Result<Vec<_>, EnergyError>>()?;

        let mut stats = EnergyStats::default();
        for (patch, result) in self.decomposition.patches().iter().zip(results.iter()) {
            self.enthalpy.release_owned(patch, &result.enthalpy);
            self.basal_melt_rate.release_owned(patch, &result.melt);
            stats.merge(&result.stats);
        }
        stats.liquified_volume =
            stats.liquified_count as f64 * self.mapping.fine_dz() * self.grid.dx * self.grid.dy;

        if stats.reduced_accuracy_count > 0 {
            log::warn!(
                "enthalpy step: vertical advection upwinded in {} of {} columns",
                stats.reduced_accuracy_count,
                stats.icy_columns
            );
        }
        log::info!(
            "enthalpy step: {} icy columns, {} liquified points ({:.3e} m³), {} bulge-limited points",
            stats.icy_columns,
            stats.liquified_count,
            stats.liquified_volume,
            stats.bulge_count
        );
        Ok(stats)
    }

    fn update_patch(
        &self,
        patch: &Patch,
        fields: &EnergyFields,
        dt: f64,
    ) -> std::result::Result<PatchResult, EnergyError> {
        let storage_mz = self.mapping.storage().mz();
        let fine_mz = self.mapping.fine_mz();
        let dz = self.mapping.fine_dz();

        let old = self.enthalpy.acquire_ghosted(patch);
        let mut enthalpy = LocalArray3::filled(patch, storage_mz, 0.0);
        let mut melt = LocalArray2::filled(patch, 0.0);
        let mut stats = EnergyStats::default();
        let mut buf = ColumnBuffers {
            column: EnthalpyColumn::new(self.material, fine_mz, dz),
            u: vec![0.0; fine_mz],
            v: vec![0.0; fine_mz],
            west: vec![0.0; fine_mz],
            east: vec![0.0; fine_mz],
            south: vec![0.0; fine_mz],
            north: vec![0.0; fine_mz],
            x: vec![0.0; fine_mz],
        };

        for (i, j) in patch.owned_points() {
            let thickness = *fields.thickness.get(i, j);
            let ks = self.mapping.ks(thickness).ok_or(EnergyError::ThicknessExceedsDomain {
                i,
                j,
                thickness,
                height: self.mapping.storage().height(),
            })?;

            let surface_enthalpy = self.ec.enthalpy_permissive(
                *fields.surface_temperature.get(i, j),
                *fields.surface_liquid_fraction.get(i, j),
                self.ec.pressure(thickness - ks as f64 * dz),
            );

            if ks == 0 {
                enthalpy.column_mut(i, j).iter_mut().for_each(|e| *e = surface_enthalpy);
                *melt.get_mut(i, j) = 0.0;
                continue;
            }
            stats.icy_columns += 1;

            self.fill_column(&mut buf, &old, fields, i, j, ks);
            let column = &mut buf.column;
            column.prepare(thickness, ks, dt, self.ec.as_ref());
            column.set_surface_enthalpy(surface_enthalpy);

            let floating = *fields.cell_type.get(i, j) == CellType::Floating;
            let base = BaseState {
                cell_type: if floating { CellType::Floating } else { CellType::Grounded },
                till_water: *fields.till_water_thickness.get(i, j),
                geothermal_flux: *fields.geothermal_flux.get(i, j),
                frictional_heating: *fields.frictional_heating.get(i, j),
            };
            let basal = self.basal_boundary(column, &base, *fields.shelf_base_temperature.get(i, j));
            column.set_basal_boundary(basal);

            column.solve(i, j, &mut buf.x)?;
            if column.reduced_accuracy() {
                stats.reduced_accuracy_count += 1;
            }

            let summary = self
                .post
                .process(&mut buf.x, column.pressures(), dz, dt, surface_enthalpy, &base);
            stats.liquified_count += summary.liquified_count;
            stats.bulge_count += summary.bulge_count;
            *melt.get_mut(i, j) = summary.melt_rate;

            self.mapping.fine_to_storage(&buf.x, enthalpy.column_mut(i, j));
        }

        Ok(PatchResult { enthalpy, melt, stats })
    }

    /// Interpolate the column inputs onto the fine grid and compute the
    /// explicit horizontal advection term
    fn fill_column(
        &self,
        buf: &mut ColumnBuffers,
        old: &LocalArray3<f64>,
        fields: &EnergyFields,
        i: usize,
        j: usize,
        ks: usize,
    ) {
        let map = &self.mapping;
        let (mx, my) = (self.grid.mx, self.grid.my);
        let column = &mut buf.column;

        map.storage_to_fine(old.column(i, j), &mut column.enthalpy);
        map.storage_to_fine(fields.w.column(i, j), &mut column.w);
        map.storage_to_fine(fields.strain_heating.column(i, j), &mut column.strain_heating);
        map.storage_to_fine(fields.u.column(i, j), &mut buf.u);
        map.storage_to_fine(fields.v.column(i, j), &mut buf.v);

        // at the domain edge the missing neighbor is the column itself
        map.storage_to_fine(old.column(i.saturating_sub(1), j), &mut buf.west);
        map.storage_to_fine(old.column((i + 1).min(mx - 1), j), &mut buf.east);
        map.storage_to_fine(old.column(i, j.saturating_sub(1)), &mut buf.south);
        map.storage_to_fine(old.column(i, (j + 1).min(my - 1)), &mut buf.north);

        for k in 0..=ks {
            let e = column.enthalpy[k];
            column.advection[k] = upwind(buf.u[k], buf.west[k], e, buf.east[k], self.grid.dx)
                + upwind(buf.v[k], buf.south[k], e, buf.north[k], self.grid.dy);
        }
    }

    /// Basal boundary condition from the old enthalpy of the column
    fn basal_boundary(&self, column: &EnthalpyColumn, base: &BaseState, shelf_base_temperature: f64) -> BasalBoundary {
        let p = column.pressures();
        if base.cell_type == CellType::Floating {
            return BasalBoundary::Enthalpy(self.ec.enthalpy_permissive(shelf_base_temperature, 0.0, p[0]));
        }
        let e_s0 = column.enthalpy_cts(0);
        let base_is_warm = column.enthalpy[0] >= e_s0;
        if base_is_warm && base.till_water > 0.0 {
            if column.enthalpy[1] >= column.enthalpy_cts(1) {
                BasalBoundary::HeatFlux(0.0)
            } else {
                BasalBoundary::Enthalpy(e_s0)
            }
        } else {
            BasalBoundary::HeatFlux(base.geothermal_flux + base.frictional_heating)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_upwind_follows_velocity_sign() {
        assert_relative_eq!(upwind(2.0, 1.0, 3.0, 7.0, 2.0), 2.0);
        assert_relative_eq!(upwind(-2.0, 1.0, 3.0, 7.0, 2.0), -4.0);
        assert_eq!(upwind(0.0, 1.0, 3.0, 7.0, 2.0), 0.0);
    }

    #[test]
    fn test_init_from_temperature_round_trips() {
        let config = Config::default();
        let grid = HorizontalGrid::from_bounds(3, 3, [0.0, 2000.0], [0.0, 2000.0]).unwrap();
        let vertical = VerticalGrid::equal(1000.0, 6).unwrap();
        let mut model = EnthalpyModel::new(&config, &grid, &vertical).unwrap();
        let thickness = Array2::filled(3, 3, 800.0);
        let temperature = Array3::from_fn(3, 3, 6, |_, _, k| 250.0 + k as f64);
        model.init_from_temperature(&temperature, None, &thickness).unwrap();
        let back = model.temperature(&thickness);
        for (a, b) in back.iter().zip(temperature.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
        assert!(model.water_fraction(&thickness).iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_init_rejects_water_in_cold_ice() {
        let config = Config::default();
        let grid = HorizontalGrid::from_bounds(2, 2, [0.0, 1.0], [0.0, 1.0]).unwrap();
        let vertical = VerticalGrid::equal(100.0, 3).unwrap();
        let mut model = EnthalpyModel::new(&config, &grid, &vertical).unwrap();
        let thickness = Array2::filled(2, 2, 50.0);
        let temperature = Array3::filled(2, 2, 3, 260.0);
        let omega = Array3::filled(2, 2, 3, 0.01);
        assert!(model.init_from_temperature(&temperature, Some(&omega), &thickness).is_err());
    }

    fn column_with_base(base_offset: f64, above_offset: f64) -> (EnthalpyModel, EnthalpyColumn) {
        let config = Config::default();
        let grid = HorizontalGrid::from_bounds(2, 2, [0.0, 1000.0], [0.0, 1000.0]).unwrap();
        let vertical = VerticalGrid::equal(100.0, 11).unwrap();
        let model = EnthalpyModel::new(&config, &grid, &vertical).unwrap();
        let dz = model.mapping.fine_dz();
        let mut column = EnthalpyColumn::new(model.material, model.mapping.fine_mz(), dz);
        let ec = model.ec.clone();
        for k in 0..=10 {
            let e_s = ec.enthalpy_cts(ec.pressure(100.0 - k as f64 * dz));
            column.enthalpy[k] = match k {
                0 => e_s + base_offset,
                1 => e_s + above_offset,
                _ => e_s - 1.0e4,
            };
        }
        column.prepare(100.0, 10, 1.0e7, ec.as_ref());
        (model, column)
    }

    fn grounded(till_water: f64) -> BaseState {
        BaseState {
            cell_type: CellType::Grounded,
            till_water,
            geothermal_flux: 0.06,
            frictional_heating: 0.02,
        }
    }

    #[test]
    fn test_wet_temperate_layer_has_insulated_base() {
        let (model, column) = column_with_base(100.0, 100.0);
        assert_eq!(model.basal_boundary(&column, &grounded(1.0), 271.0), BasalBoundary::HeatFlux(0.0));
    }

    #[test]
    fn test_wet_warm_base_under_cold_ice_is_at_melting_point() {
        let (model, column) = column_with_base(100.0, -1.0e4);
        let bc = model.basal_boundary(&column, &grounded(1.0), 271.0);
        assert_eq!(bc, BasalBoundary::Enthalpy(column.enthalpy_cts(0)));
    }

    #[test]
    fn test_dry_or_cold_base_takes_geothermal_and_frictional_heat() {
        // warm without till water
        let (model, column) = column_with_base(100.0, 100.0);
        match model.basal_boundary(&column, &grounded(0.0), 271.0) {
            BasalBoundary::HeatFlux(q) => assert_relative_eq!(q, 0.08, epsilon = 1e-15),
            other => panic!("unexpected basal condition {:?}", other),
        }
        // cold over wet till
        let (model, column) = column_with_base(-1.0e4, 100.0);
        match model.basal_boundary(&column, &grounded(1.0), 271.0) {
            BasalBoundary::HeatFlux(q) => assert_relative_eq!(q, 0.08, epsilon = 1e-15),
            other => panic!("unexpected basal condition {:?}", other),
        }
    }

    #[test]
    fn test_floating_base_is_at_shelf_temperature() {
        let (model, column) = column_with_base(100.0, 100.0);
        let base = BaseState {
            cell_type: CellType::Floating,
            ..grounded(1.0)
        };
        let expected = model.ec.enthalpy_permissive(271.0, 0.0, column.pressures()[0]);
        assert_eq!(model.basal_boundary(&column, &base, 271.0), BasalBoundary::Enthalpy(expected));
    }
}
