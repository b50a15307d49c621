pub mod solver;
pub mod direct;
pub mod iterative;
pub mod preconditioner;
pub mod tridiagonal;

pub use solver::{Solver, SolverStats, SolverUtils, LinearOperator};
pub use direct::DirectSolver;
pub use iterative::{ConjugateGradient, GMRES, KrylovMethod};
pub use preconditioner::{Preconditioner, JacobiPreconditioner};
pub use tridiagonal::TridiagonalSystem;
