//! Infrastructure Layer
//!
//! This module contains all adapters (implementations) for the ports defined
//! in the application layer. Following hexagonal architecture:
//!
//! - **Driven Adapters (Outbound)**: Implement ports for external systems
//!   - `broker/`: Simulated execution venue
//!   - `persistence/`: In-memory repositories
//!   - `messaging/`: In-process message bus
//!   - `risk/`: Limit-based risk gate

pub mod broker;
pub mod messaging;
pub mod persistence;
pub mod risk;
