pub mod forcing;
pub mod assembly;
pub mod multigrid;
pub mod blatter;

pub use forcing::{BoundaryForcing, NoForcing, UniformSliding};
pub use assembly::{strain_rate_invariant, BlatterAssembler, VelocityField};
pub use multigrid::{MultigridSolver, SolveStats};
pub use blatter::{vertical_velocity, Blatter, StressBalanceInputs, Velocity3d};
