pub mod config;
pub mod error;
pub mod grid;
pub mod fem;
pub mod linalg;
pub mod physics;
pub mod stressbalance; // Blatter-Pattyn velocity solver
pub mod energy;        // Enthalpy and age columns
pub mod model;
pub mod utils;

pub use config::{Config, EnergyConfig, PhysicalConstants, StressBalanceConfig};
pub use error::{ConfigError, EnergyError, Error, Result, SolverError};
pub use grid::{Array2, Array3, Decomposition, GridHierarchy, HorizontalGrid, NodeType, VerticalGrid, VerticalMapping};
pub use physics::{flow_law_from_name, EnthalpyConverter, FlowLaw};
pub use stressbalance::{Blatter, BoundaryForcing, SolveStats, StressBalanceInputs, Velocity3d};
pub use energy::{AgeModel, CellType, EnergyInputs, EnergyStats, EnthalpyModel};
pub use model::{BoundaryData, Geometry, IceModel, StepStats};
pub use utils::units;
