//! Order Execution Bounded Context
//!
//! Owns the lifecycle of a single trade intent from approval to its
//! terminal outcome.
//!
//! # Key Concepts
//!
//! - **Order Aggregate**: identity plus lifecycle state, mutated only through
//!   state-machine-checked transitions
//! - **Executed fields**: price, quantity and time of execution, stamped
//!   exactly once on `APPROVED → EXECUTED`

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{CreateOrderCommand, Order};
pub use errors::OrderError;
pub use repository::{OrderFilter, OrderRepository};
pub use services::OrderStateMachine;
pub use value_objects::{OrderSide, OrderStatus, OrderType};
