//! Post-processing of a solved enthalpy column
//!
//! Applied to levels `0..ks` after the implicit solve. Each level is first
//! capped below full liquefaction and then drained by gravity. Cold
//! numerical bulges are limited next and, for grounded ice over wet till,
//! enthalpy is made continuous across the base. The drained and re-frozen
//! water enter the basal melt rate; energy removed by capping is lost.

use std::sync::Arc;

use super::inputs::CellType;
use crate::config::{EnergyConfig, PhysicalConstants};
use crate::physics::drainage::DrainageCalculator;
use crate::physics::enthalpy::{Conductivity, EnthalpyConverter};

/// Basal inputs of one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseState {
    pub cell_type: CellType,
    /// Till water thickness (m)
    pub till_water: f64,
    /// Geothermal flux (W/m²)
    pub geothermal_flux: f64,
    /// Frictional heating (W/m²)
    pub frictional_heating: f64,
}

/// What the post-processing did to one column
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColumnSummary {
    /// Water removed by drainage (m)
    pub drained_thickness: f64,
    /// Water re-frozen by the basal continuity correction (m)
    pub frozen_thickness: f64,
    /// Levels capped at the liquid limit
    pub liquified_count: usize,
    /// Levels raised by the bulge limiter
    pub bulge_count: usize,
    /// Basal melt rate (m/s, ice equivalent)
    pub melt_rate: f64,
}

/// Drainage, capping, bulge limiting and basal melt of solved columns
#[derive(Clone)]
pub struct ColumnPostProcessor {
    ec: Arc<dyn EnthalpyConverter>,
    drainage: DrainageCalculator,
    target_water_fraction: f64,
    liquid_cap_fraction: f64,
    bulge_max: f64,
    density: f64,
    conductivity: Conductivity,
}

impl ColumnPostProcessor {
    pub fn new(ec: Arc<dyn EnthalpyConverter>, energy: &EnergyConfig, constants: &PhysicalConstants) -> Self {
        let conductivity = if energy.variable_conductivity {
            Conductivity::TemperatureDependent
        } else {
            Conductivity::Constant(constants.ice_conductivity)
        };
        Self {
            ec,
            drainage: DrainageCalculator::new(energy),
            target_water_fraction: energy.drainage_target_water_fraction,
            liquid_cap_fraction: energy.liquid_cap_fraction,
            bulge_max: energy.enthalpy_cold_bulge_max,
            density: constants.ice_density,
            conductivity,
        }
    }

    fn latent_heat(&self, pressure: f64) -> f64 {
        self.ec.latent_heat(self.ec.melting_temperature(pressure))
    }

    /// Cap each level `0..pressure.len() - 1` at `E_s + f L`, then drain
    /// water in excess of the target fraction from it
    ///
    /// Returns the drained thickness and the number of capped levels.
    pub fn cap_and_drain(&self, x: &mut [f64], pressure: &[f64], dz: f64, dt: f64) -> (f64, usize) {
        let ks = pressure.len().saturating_sub(1);
        let mut drained = 0.0;
        let mut capped = 0;
        for k in 0..ks {
            let e_s = self.ec.enthalpy_cts(pressure[k]);
            if x[k] <= e_s {
                continue;
            }
            let latent = self.latent_heat(pressure[k]);
            let cap = e_s + self.liquid_cap_fraction * latent;
            if x[k] >= cap {
                capped += 1;
                x[k] = cap;
            }

            let omega = self.ec.water_fraction(x[k], pressure[k]);
            if omega > self.target_water_fraction {
                let fraction = (self.drainage.rate(omega) * dt).min(omega - self.target_water_fraction);
                x[k] -= fraction * latent;
                drained += fraction * dz;
            }
        }
        (drained, capped)
    }

    /// Raise levels `0..ks` more than the bulge margin below the surface
    /// enthalpy; returns the number of raised levels
    pub fn limit_bulge(&self, x: &mut [f64], ks: usize, surface_enthalpy: f64) -> usize {
        let floor = surface_enthalpy - self.bulge_max;
        let mut count = 0;
        for e in x[..ks].iter_mut() {
            if *e < floor {
                *e = floor;
                count += 1;
            }
        }
        count
    }

    /// Force the basal enthalpy up to pressure-melting when water is
    /// available, returning the thickness of water frozen to supply the
    /// energy of the bottom half cell
    pub fn basal_continuity(&self, x: &mut [f64], basal_pressure: f64, dz: f64, till_water: f64) -> f64 {
        let e_s = self.ec.enthalpy_cts(basal_pressure);
        if till_water > 0.0 && x[0] < e_s {
            let frozen = (e_s - x[0]) / self.latent_heat(basal_pressure) * (0.5 * dz);
            x[0] = e_s;
            frozen
        } else {
            0.0
        }
    }

    /// Basal melt rate of a grounded column with at least two levels
    ///
    /// `(F_b + G - q_up) / (ρ L)`, zero for a cold and dry base and never
    /// negative without till water, plus the drained minus frozen water
    /// per unit time.
    #[allow(clippy::too_many_arguments)]
    pub fn basal_melt_rate(
        &self,
        x: &[f64],
        pressure: &[f64],
        dz: f64,
        dt: f64,
        base: &BaseState,
        drained: f64,
        frozen: f64,
    ) -> f64 {
        if base.cell_type != CellType::Grounded || pressure.len() < 2 {
            return 0.0;
        }
        let ec = self.ec.as_ref();
        let (p0, p1) = (pressure[0], pressure[1]);
        let cold_and_dry = x[0] < ec.enthalpy_cts(p0) && base.till_water <= 0.0;

        let mut melt = if cold_and_dry {
            0.0
        } else {
            let heat_flux_up = if ec.is_temperate(x[1], p1) {
                let (t0, t1) = (ec.melting_temperature(p0), ec.melting_temperature(p1));
                -self.conductivity.at(t0) * (t1 - t0) / dz
            } else {
                let t0 = ec.temperature(x[0], p0);
                let k0 = self.conductivity.at(t0) / ec.specific_heat();
                -k0 * (x[1] - x[0]) / dz
            };
            let latent = self.latent_heat(p0);
            let rate = (base.frictional_heating + base.geothermal_flux - heat_flux_up) / (self.density * latent);
            if base.till_water <= 0.0 {
                rate.max(0.0)
            } else {
                rate
            }
        };
        melt += (drained - frozen) / dt;
        melt
    }

    /// Run every step on a solved column whose levels `0..=ks` have the
    /// given pressures
    pub fn process(
        &self,
        x: &mut [f64],
        pressure: &[f64],
        dz: f64,
        dt: f64,
        surface_enthalpy: f64,
        base: &BaseState,
    ) -> ColumnSummary {
        let ks = pressure.len().saturating_sub(1);
        let mut summary = ColumnSummary::default();
        if ks == 0 {
            return summary;
        }

        let (drained, capped) = self.cap_and_drain(x, pressure, dz, dt);
        summary.drained_thickness = drained;
        summary.liquified_count = capped;
        summary.bulge_count = self.limit_bulge(x, ks, surface_enthalpy);

        if base.cell_type == CellType::Grounded {
            summary.frozen_thickness = self.basal_continuity(x, pressure[0], dz, base.till_water);
            summary.melt_rate = self.basal_melt_rate(
                x,
                pressure,
                dz,
                dt,
                base,
                summary.drained_thickness,
                summary.frozen_thickness,
            );
        }
        summary
    }
}
