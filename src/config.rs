//! Configuration bundle for the ice dynamics core
//!
//! Reads TOML configuration files and provides the physical constants and
//! numerical options used by the stress balance and energy solvers. Every
//! field has a default, so an empty file (or `Config::default()`) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::utils::units::{m_per_year_to_m_per_s, per_year_to_per_second};

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub constants: PhysicalConstants,
    pub energy: EnergyConfig,
    pub stress_balance: StressBalanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhysicalConstants {
    /// Ice density (kg/m³)
    pub ice_density: f64,
    /// Sea water density (kg/m³)
    pub sea_water_density: f64,
    /// Acceleration due to gravity (m/s²)
    pub standard_gravity: f64,
    /// Specific heat capacity of ice (J/(kg K))
    pub ice_specific_heat: f64,
    /// Thermal conductivity of ice (W/(m K))
    pub ice_conductivity: f64,
    /// Specific heat capacity of fresh water (J/(kg K))
    pub water_specific_heat: f64,
    /// Latent heat of fusion (J/kg)
    pub latent_heat: f64,
    /// Melting point at atmospheric pressure (K)
    pub melting_point: f64,
    /// Clausius-Clapeyron constant (K/Pa)
    pub beta_clausius_clapeyron: f64,
    /// Reference temperature for the enthalpy scale (K)
    pub reference_temperature: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            ice_density: 910.0,
            sea_water_density: 1028.0,
            standard_gravity: 9.81,
            ice_specific_heat: 2009.0,
            ice_conductivity: 2.10,
            water_specific_heat: 4170.0,
            latent_heat: 3.34e5,
            melting_point: 273.15,
            beta_clausius_clapeyron: 7.9e-8,
            reference_temperature: 223.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Enthalpy converter name: "default" or "kirchhoff"
    pub converter: String,
    /// Maximum depth of a cold numerical bulge below the surface enthalpy (J/kg)
    pub enthalpy_cold_bulge_max: f64,
    /// Water fraction below which no drainage occurs
    pub drainage_target_water_fraction: f64,
    /// Enthalpy above pressure-melting is capped at this fraction of L
    pub liquid_cap_fraction: f64,
    /// Ratio of temperate to cold ice enthalpy conductivity
    pub temperate_conductivity_ratio: f64,
    /// Use the temperature-dependent conductivity k(T) = 9.828 exp(-0.0057 T)
    pub variable_conductivity: bool,
    /// Drainage rate at 2% water fraction (1/year)
    pub drainage_rate_2pct_per_year: f64,
    /// Drainage rate at and above 3% water fraction (1/year)
    pub drainage_rate_3pct_per_year: f64,
    /// Also advance the age field every step
    pub age_enabled: bool,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            converter: "default".to_string(),
            enthalpy_cold_bulge_max: 60270.0, // = c_i * 30 K
            drainage_target_water_fraction: 0.01,
            liquid_cap_fraction: 0.5,
            temperate_conductivity_ratio: 0.1,
            variable_conductivity: false,
            drainage_rate_2pct_per_year: 0.5,
            drainage_rate_3pct_per_year: 4.5,
            age_enabled: false,
        }
    }
}

impl EnergyConfig {
    /// Drainage rate at 2% water fraction (1/s)
    pub fn drainage_rate_2pct(&self) -> f64 {
        per_year_to_per_second(self.drainage_rate_2pct_per_year)
    }

    /// Drainage rate at and above 3% water fraction (1/s)
    pub fn drainage_rate_3pct(&self) -> f64 {
        per_year_to_per_second(self.drainage_rate_3pct_per_year)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StressBalanceConfig {
    /// Flow law name (see `physics::flow_law_from_name`)
    pub flow_law: String,
    /// Glen exponent n
    pub glen_exponent: f64,
    /// Softness A of isothermal ice (Pa^-n s^-1); sets the initial hardness
    pub ice_softness: f64,
    /// Regularization velocity scale (m/year)
    pub regularization_velocity: f64,
    /// Regularization length scale (m)
    pub regularization_length: f64,
    /// Ice thinner than this is treated as ice-free (m)
    pub min_thickness: f64,
    /// Number of vertical sigma nodes before padding
    pub mz: usize,
    /// Number of multigrid levels
    pub n_levels: usize,
    /// Halo width of the domain decomposition; only 1 is supported
    pub stencil_width: usize,
    /// Number of patches in x and y
    pub partitions: [usize; 2],
    /// Maximum number of multigrid cycles
    pub max_cycles: usize,
    /// Newton steps before restriction on each non-coarsest level
    pub pre_smooth: usize,
    /// Newton steps after prolongation on each non-coarsest level
    pub post_smooth: usize,
    /// Newton iterations on the coarsest level
    pub coarse_newton_iterations: usize,
    /// Krylov iterations per smoothing Newton step
    pub smoother_linear_iterations: usize,
    /// Relative tolerance on the fine-level residual norm
    pub rtol: f64,
    /// Absolute tolerance on the fine-level residual norm
    pub atol: f64,
    /// Krylov solver: "cg" or "gmres"
    pub linear_solver: String,
    /// Krylov relative tolerance
    pub linear_rtol: f64,
    /// Line search: maximum number of step reductions
    pub max_line_search: usize,
    /// Line search: step reduction factor
    pub line_search_rho: f64,
}

impl Default for StressBalanceConfig {
    fn default() -> Self {
        Self {
            flow_law: "isothermal_glen".to_string(),
            glen_exponent: 3.0,
            ice_softness: 3.1689e-24,
            regularization_velocity: 1.0,
            regularization_length: 1000e3,
            min_thickness: 0.1,
            mz: 5,
            n_levels: 2,
            stencil_width: 1,
            partitions: [1, 1],
            max_cycles: 30,
            pre_smooth: 1,
            post_smooth: 1,
            coarse_newton_iterations: 2,
            smoother_linear_iterations: 50,
            rtol: 1e-8,
            atol: 1e-10,
            linear_solver: "cg".to_string(),
            linear_rtol: 1e-10,
            max_line_search: 10,
            line_search_rho: 0.5,
        }
    }
}

impl StressBalanceConfig {
    /// Regularization added to the strain-rate invariant, in 1/s²
    pub fn regularization(&self) -> f64 {
        let v = m_per_year_to_m_per_s(self.regularization_velocity);
        (v / self.regularization_length).powi(2)
    }

    /// Hardness B = A^(-1/n) of isothermal ice (Pa s^(1/n))
    pub fn isothermal_hardness(&self) -> f64 {
        self.ice_softness.powf(-1.0 / self.glen_exponent)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a solve meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.constants;
        let positive = [
            ("constants.ice_density", c.ice_density),
            ("constants.sea_water_density", c.sea_water_density),
            ("constants.standard_gravity", c.standard_gravity),
            ("constants.ice_specific_heat", c.ice_specific_heat),
            ("constants.ice_conductivity", c.ice_conductivity),
            ("constants.latent_heat", c.latent_heat),
            ("constants.melting_point", c.melting_point),
            ("energy.temperate_conductivity_ratio", self.energy.temperate_conductivity_ratio),
            ("energy.liquid_cap_fraction", self.energy.liquid_cap_fraction),
            ("stress_balance.glen_exponent", self.stress_balance.glen_exponent),
            ("stress_balance.ice_softness", self.stress_balance.ice_softness),
            ("stress_balance.min_thickness", self.stress_balance.min_thickness),
            ("stress_balance.rtol", self.stress_balance.rtol),
            ("stress_balance.linear_rtol", self.stress_balance.linear_rtol),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::invalid(name, format!("must be positive, got {}", value)));
            }
        }

        if self.energy.enthalpy_cold_bulge_max < 0.0 {
            return Err(ConfigError::invalid(
                "energy.enthalpy_cold_bulge_max",
                "must be non-negative",
            ));
        }

        let omega = self.energy.drainage_target_water_fraction;
        if !(0.0..1.0).contains(&omega) {
            return Err(ConfigError::invalid(
                "energy.drainage_target_water_fraction",
                format!("must be in [0, 1), got {}", omega),
            ));
        }

        let sb = &self.stress_balance;
        if sb.stencil_width != 1 {
            return Err(ConfigError::StencilWidth(sb.stencil_width));
        }
        if sb.mz < 2 {
            return Err(ConfigError::invalid("stress_balance.mz", "need at least 2 nodes"));
        }
        if sb.n_levels == 0 {
            return Err(ConfigError::invalid("stress_balance.n_levels", "need at least 1 level"));
        }
        if sb.partitions[0] == 0 || sb.partitions[1] == 0 {
            return Err(ConfigError::invalid("stress_balance.partitions", "must be non-zero"));
        }
        if !(sb.line_search_rho > 0.0 && sb.line_search_rho < 1.0) {
            return Err(ConfigError::invalid("stress_balance.line_search_rho", "must be in (0, 1)"));
        }
        match sb.linear_solver.as_str() {
            "cg" | "gmres" => {}
            other => {
                return Err(ConfigError::UnknownName {
                    kind: "linear solver",
                    name: other.to_string(),
                })
            }
        }

        Ok(())
    }

    /// Log a configuration summary
    pub fn log_summary(&self) {
        let sb = &self.stress_balance;
        log::info!(
            "stress balance: flow law '{}' (n = {}), {} levels, mz = {}, {} x {} patches",
            sb.flow_law,
            sb.glen_exponent,
            sb.n_levels,
            sb.mz,
            sb.partitions[0],
            sb.partitions[1]
        );
        log::info!(
            "energy: converter '{}', bulge max {:.0} J/kg, drainage target {:.2}",
            self.energy.converter,
            self.energy.enthalpy_cold_bulge_max,
            self.energy.drainage_target_water_fraction
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.constants.ice_density, 910.0);
        assert_eq!(config.stress_balance.stencil_width, 1);
        assert_eq!(config.energy.converter, "default");
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
            [energy]
            enthalpy_cold_bulge_max = 1000.0

            [stress_balance]
            flow_law = "newtonian"
            n_levels = 3
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.energy.enthalpy_cold_bulge_max, 1000.0);
        assert_eq!(config.stress_balance.flow_law, "newtonian");
        assert_eq!(config.stress_balance.n_levels, 3);
        // untouched fields keep their defaults
        assert_eq!(config.stress_balance.mz, 5);
    }

    #[test]
    fn test_wide_halo_rejected() {
        let toml = "[stress_balance]\nstencil_width = 2\n";
        match Config::from_toml_str(toml) {
            Err(ConfigError::StencilWidth(2)) => {}
            other => panic!("expected stencil width error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_density_rejected() {
        let mut config = Config::default();
        config.constants.ice_density = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_regularization_is_small() {
        let config = StressBalanceConfig::default();
        let reg = config.regularization();
        assert!(reg > 0.0 && reg < 1e-20);
    }
}
