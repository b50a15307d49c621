//! Energy balance and age of the ice
//!
//! Column-wise implicit solvers on an equally spaced fine vertical grid.
//! Storage fields are interpolated onto the fine grid before a column solve
//! and back afterwards.

pub mod age;
pub mod column;
pub mod enthalpy_model;
pub mod inputs;
pub mod postprocess;

pub use age::AgeModel;
pub use column::{BasalBoundary, ColumnMaterial, EnthalpyColumn};
pub use enthalpy_model::{EnergyStats, EnthalpyModel};
pub use inputs::{CellType, EnergyFields, EnergyInputs};
pub use postprocess::{BaseState, ColumnPostProcessor, ColumnSummary};
