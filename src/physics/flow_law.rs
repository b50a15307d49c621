//! Ice flow laws for the first-order stress balance
//!
//! A flow law maps the ice hardness `B` and the second invariant `gamma` of
//! the first-order strain rate to an effective viscosity. For Glen's law
//!
//! ```text
//! eta(gamma) = B/2 * (gamma + eps)^((1 - n) / (2n))
//! ```
//!
//! where `eps` is a small regularization that keeps `eta` finite at zero
//! strain rate.

use crate::config::StressBalanceConfig;
use crate::error::ConfigError;

pub trait FlowLaw: Send + Sync {
    fn name(&self) -> &str;

    /// Effective viscosity and its derivative with respect to `gamma`
    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64);
}

/// Glen-type power law with exponent `n`
#[derive(Debug, Clone)]
pub struct GlenFlowLaw {
    name: String,
    n: f64,
    regularization: f64,
}

impl GlenFlowLaw {
    pub fn new(name: impl Into<String>, n: f64, regularization: f64) -> Self {
        Self {
            name: name.into(),
            n,
            regularization,
        }
    }

    pub fn exponent(&self) -> f64 {
        self.n
    }
}

impl FlowLaw for GlenFlowLaw {
    fn name(&self) -> &str {
        &self.name
    }

    fn effective_viscosity(&self, hardness: f64, gamma: f64) -> (f64, f64) {
        let power = (1.0 - self.n) / (2.0 * self.n);
        let g = gamma + self.regularization;
        let eta = 0.5 * hardness * g.powf(power);
        (eta, power * eta / g)
    }
}

/// Linear viscous law; `eta = B/2` regardless of strain rate
#[derive(Debug, Clone, Default)]
pub struct NewtonianFlowLaw;

impl FlowLaw for NewtonianFlowLaw {
    fn name(&self) -> &str {
        "newtonian"
    }

    fn effective_viscosity(&self, hardness: f64, _gamma: f64) -> (f64, f64) {
        (0.5 * hardness, 0.0)
    }
}

/// Build a flow law by name
///
/// The Goldsby-Kohlstedt law does not fit the `eta(B, gamma)` form used by
/// the stress balance and is rejected.
pub fn flow_law_from_name(
    name: &str,
    config: &StressBalanceConfig,
) -> Result<Box<dyn FlowLaw>, ConfigError> {
    match name {
        "isothermal_glen" | "gpbld" | "pb" | "arr" | "arrwarm" | "hooke" => Ok(Box::new(
            GlenFlowLaw::new(name, config.glen_exponent, config.regularization()),
        )),
        "newtonian" => Ok(Box::new(NewtonianFlowLaw)),
        "gk" | "goldsby_kohlstedt" => Err(ConfigError::invalid(
            "stress_balance.flow_law",
            "the Goldsby-Kohlstedt flow law is not supported by the Blatter solver",
        )),
        other => Err(ConfigError::UnknownName {
            kind: "flow law",
            name: other.to_string(),
        }),
    }
}
