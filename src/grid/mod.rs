pub mod array;
pub mod decomposition;
pub mod horizontal;
pub mod vertical;
pub mod level;
pub mod hierarchy;

pub use array::{Array2, Array3};
pub use decomposition::{Decomposition, LocalArray2, LocalArray3, Patch};
pub use horizontal::HorizontalGrid;
pub use vertical::{VerticalGrid, VerticalMapping};
pub use level::{grid_padding, grid_xy, grid_z, GridLevel, NodeType, Parameters};
pub use hierarchy::{restrict_and_reclassify, GridHierarchy};
