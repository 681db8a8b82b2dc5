//! Risk Gate Adapters

pub mod limits;

pub use limits::LimitsRiskGate;
