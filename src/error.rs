//! Error types for the stress-balance and energy solvers.
//!
//! Every error is fatal for the current time step. Retrying with a shorter
//! step is up to whoever drives the time loop.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("stress balance failure: {0}")]
    Solver(#[from] SolverError),

    #[error("energy balance failure: {0}")]
    Energy(#[from] EnergyError),
}

/// Setup problems detected before any computation starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required option is missing or out of range.
    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    /// A name-keyed factory got a name it does not know.
    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    /// A required input field was never provided.
    #[error("un-initialized input '{0}'")]
    MissingInput(&'static str),

    /// An input field does not match the grid it is used with.
    #[error("input '{name}' has {actual} entries, expected {expected}")]
    SizeMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Halo widths other than one cell are rejected.
    #[error("stencil width {0} is not supported (must be 1)")]
    StencilWidth(usize),

    /// The grid cannot be coarsened the requested number of times.
    #[error("grid with {points} points cannot be coarsened to {levels} levels")]
    NotCoarsenable { points: usize, levels: usize },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the nonlinear (multigrid/Newton) stress-balance solve.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("nonlinear solver diverged after {iterations} iterations (|R| = {residual_norm:.3e})")]
    Diverged {
        iterations: usize,
        residual_norm: f64,
    },

    #[error("linear solve failed on level {level} at Newton iteration {newton_iteration} (|r| = {residual:.3e})")]
    LinearSolveFailed {
        level: usize,
        newton_iteration: usize,
        residual: f64,
    },

    #[error("singular Jacobian on level {level}")]
    SingularJacobian { level: usize },

    #[error("non-finite residual on level {level}")]
    NonFinite { level: usize },
}

/// Failures of the column solvers (enthalpy and age).
#[derive(Error, Debug)]
pub enum EnergyError {
    /// Zero pivot in the tridiagonal elimination; `dump` lists the system.
    #[error("tridiagonal solve of {system} system failed at (i, j) = ({i}, {j}): zero pivot in row {row} (ks = {ks})\n{dump}")]
    ZeroPivot {
        system: &'static str,
        i: usize,
        j: usize,
        row: usize,
        ks: usize,
        dump: String,
    },

    #[error("ice thickness {thickness} m at (i, j) = ({i}, {j}) exceeds the domain height {height} m")]
    ThicknessExceedsDomain {
        i: usize,
        j: usize,
        thickness: f64,
        height: f64,
    },

    #[error("{0}")]
    InvalidState(String),
}
