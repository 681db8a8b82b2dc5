//! Application Ports (Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! Concrete adapters live in `crate::infrastructure`.

mod broker_port;
mod message_bus_port;
mod risk_gate_port;

#[cfg(test)]
pub use broker_port::MockBrokerPort;
pub use broker_port::{
    AccountPosition, AccountSnapshot, BrokerError, BrokerPort, Fill, OrderResult,
    OrderStatusReport,
};
pub use message_bus_port::{BusMessage, MessageBusError, MessageBusPort};
#[cfg(test)]
pub use risk_gate_port::MockRiskGatePort;
pub use risk_gate_port::{RiskDecision, RiskGateError, RiskGatePort};
