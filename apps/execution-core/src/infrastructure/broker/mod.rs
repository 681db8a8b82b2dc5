//! Broker Adapters
//!
//! Implementations of `BrokerPort`.

pub mod simulated;

pub use simulated::{BrokerOrder, BrokerOrderError, SimulatedBroker, VenueLedger};
