pub mod basis;
pub mod quadrature;

pub use basis::{Q1Element, Q1FaceElement, Q1Hex, ShapeValue, VelocityGradient};
pub use quadrature::GaussQuadrature;
