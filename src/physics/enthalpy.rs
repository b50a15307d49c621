//! Enthalpy converters
//!
//! Conversions between ice enthalpy, temperature, liquid water fraction and
//! pressure. Enthalpy is measured relative to the reference temperature
//! `T_0`, so cold ice has `E = c_i (T - T_0)` and the cold-temperate
//! transition at pressure `p` sits at `E_s(p) = c_i (T_m(p) - T_0)`.
//!
//! # References
//! - Aschwanden, Bueler, Khroulev & Blatter (2012), "An enthalpy formulation
//!   for glaciers and ice sheets", J. Glaciol. 58 (209)

use std::sync::Arc;

use crate::config::PhysicalConstants;
use crate::error::{ConfigError, EnergyError};

/// Enthalpy, temperature and water fraction conversions
pub trait EnthalpyConverter: Send + Sync {
    fn name(&self) -> &str;

    /// Hydrostatic pressure at `depth` below the ice surface (Pa)
    fn pressure(&self, depth: f64) -> f64;

    /// Pressure-melting temperature (K)
    fn melting_temperature(&self, pressure: f64) -> f64;

    /// Latent heat of fusion at the melting temperature `t_melting` (J/kg)
    fn latent_heat(&self, t_melting: f64) -> f64;

    /// Enthalpy at the cold-temperate transition, `E_s(p)`
    fn enthalpy_cts(&self, pressure: f64) -> f64;

    /// Specific heat capacity of ice
    fn specific_heat(&self) -> f64;

    /// Reference temperature `T_0` of the enthalpy scale
    fn reference_temperature(&self) -> f64;

    /// Enthalpy of fully liquified ice
    fn enthalpy_liquid(&self, pressure: f64) -> f64 {
        let t_m = self.melting_temperature(pressure);
        self.enthalpy_cts(pressure) + self.latent_heat(t_m)
    }

    fn is_temperate(&self, enthalpy: f64, pressure: f64) -> bool {
        enthalpy >= self.enthalpy_cts(pressure)
    }

    /// Absolute temperature; equals `T_m(p)` for temperate ice
    fn temperature(&self, enthalpy: f64, pressure: f64) -> f64 {
        if enthalpy < self.enthalpy_cts(pressure) {
            enthalpy / self.specific_heat() + self.reference_temperature()
        } else {
            self.melting_temperature(pressure)
        }
    }

    /// Liquid water fraction; zero for cold ice
    fn water_fraction(&self, enthalpy: f64, pressure: f64) -> f64 {
        let e_s = self.enthalpy_cts(pressure);
        if enthalpy <= e_s {
            0.0
        } else {
            (enthalpy - e_s) / self.latent_heat(self.melting_temperature(pressure))
        }
    }

    /// Enthalpy from temperature and water fraction, rejecting inconsistent
    /// states (ice above melting, water in cold ice)
    fn enthalpy(&self, temperature: f64, omega: f64, pressure: f64) -> Result<f64, EnergyError> {
        let t_m = self.melting_temperature(pressure);
        if temperature > t_m + 1e-12 {
            return Err(EnergyError::InvalidState(format!(
                "temperature {} K exceeds the melting point {} K at p = {} Pa",
                temperature, t_m, pressure
            )));
        }
        if !(0.0..=1.0).contains(&omega) {
            return Err(EnergyError::InvalidState(format!(
                "water fraction {} is outside [0, 1]",
                omega
            )));
        }
        if temperature < t_m && omega > 0.0 {
            return Err(EnergyError::InvalidState(format!(
                "cold ice at T = {} K cannot hold liquid water (omega = {})",
                temperature, omega
            )));
        }
        Ok(self.enthalpy_permissive(temperature, omega, pressure))
    }

    /// Enthalpy from temperature and water fraction; `T >= T_m` is treated
    /// as temperate, and `omega` is ignored for cold ice
    fn enthalpy_permissive(&self, temperature: f64, omega: f64, pressure: f64) -> f64 {
        let t_m = self.melting_temperature(pressure);
        if temperature < t_m {
            self.specific_heat() * (temperature - self.reference_temperature())
        } else {
            self.enthalpy_cts(pressure) + omega.clamp(0.0, 1.0) * self.latent_heat(t_m)
        }
    }
}

/// Converter with constant latent heat and specific heat
#[derive(Debug, Clone)]
pub struct DefaultEnthalpyConverter {
    rho_g: f64,
    beta: f64,
    c_i: f64,
    latent_heat: f64,
    t_melting: f64,
    t_0: f64,
}

impl DefaultEnthalpyConverter {
    pub fn new(constants: &PhysicalConstants) -> Self {
        Self {
            rho_g: constants.ice_density * constants.standard_gravity,
            beta: constants.beta_clausius_clapeyron,
            c_i: constants.ice_specific_heat,
            latent_heat: constants.latent_heat,
            t_melting: constants.melting_point,
            t_0: constants.reference_temperature,
        }
    }
}

impl EnthalpyConverter for DefaultEnthalpyConverter {
    fn name(&self) -> &str {
        "default"
    }

    fn pressure(&self, depth: f64) -> f64 {
        self.rho_g * depth.max(0.0)
    }

    fn melting_temperature(&self, pressure: f64) -> f64 {
        self.t_melting - self.beta * pressure
    }

    fn latent_heat(&self, _t_melting: f64) -> f64 {
        self.latent_heat
    }

    fn enthalpy_cts(&self, pressure: f64) -> f64 {
        self.c_i * (self.melting_temperature(pressure) - self.t_0)
    }

    fn specific_heat(&self) -> f64 {
        self.c_i
    }

    fn reference_temperature(&self) -> f64 {
        self.t_0
    }
}

/// Converter with Kirchhoff's law for the latent heat:
/// `L(T_m) = L_0 + (c_w - c_i) (T_m - 273.15 K)`
#[derive(Debug, Clone)]
pub struct KirchhoffEnthalpyConverter {
    base: DefaultEnthalpyConverter,
    c_w: f64,
}

impl KirchhoffEnthalpyConverter {
    pub fn new(constants: &PhysicalConstants) -> Self {
        Self {
            base: DefaultEnthalpyConverter::new(constants),
            c_w: constants.water_specific_heat,
        }
    }
}

impl EnthalpyConverter for KirchhoffEnthalpyConverter {
    fn name(&self) -> &str {
        "kirchhoff"
    }

    fn pressure(&self, depth: f64) -> f64 {
        self.base.pressure(depth)
    }

    fn melting_temperature(&self, pressure: f64) -> f64 {
        self.base.melting_temperature(pressure)
    }

    fn latent_heat(&self, t_melting: f64) -> f64 {
        self.base.latent_heat + (self.c_w - self.base.c_i) * (t_melting - self.base.t_melting)
    }

    fn enthalpy_cts(&self, pressure: f64) -> f64 {
        self.base.enthalpy_cts(pressure)
    }

    fn specific_heat(&self) -> f64 {
        self.base.c_i
    }

    fn reference_temperature(&self) -> f64 {
        self.base.t_0
    }
}

/// Build a converter by name: "default" or "kirchhoff"
pub fn enthalpy_converter_from_name(
    name: &str,
    constants: &PhysicalConstants,
) -> Result<Arc<dyn EnthalpyConverter>, ConfigError> {
    match name {
        "default" => Ok(Arc::new(DefaultEnthalpyConverter::new(constants))),
        "kirchhoff" => Ok(Arc::new(KirchhoffEnthalpyConverter::new(constants))),
        other => Err(ConfigError::UnknownName {
            kind: "enthalpy converter",
            name: other.to_string(),
        }),
    }
}

/// Thermal conductivity of cold ice
#[derive(Debug, Clone, Copy)]
pub enum Conductivity {
    Constant(f64),
    /// `k(T) = 9.828 exp(-0.0057 T)` W/(m K), T in kelvin
    TemperatureDependent,
}

impl Conductivity {
    pub fn at(&self, temperature: f64) -> f64 {
        match *self {
            Conductivity::Constant(k) => k,
            Conductivity::TemperatureDependent => 9.828 * (-0.0057 * temperature).exp(),
        }
    }
}
