pub mod enthalpy;
pub mod flow_law;
pub mod drainage;

pub use enthalpy::{
    enthalpy_converter_from_name, Conductivity, DefaultEnthalpyConverter, EnthalpyConverter,
    KirchhoffEnthalpyConverter,
};
pub use flow_law::{flow_law_from_name, FlowLaw, GlenFlowLaw, NewtonianFlowLaw};
pub use drainage::DrainageCalculator;
