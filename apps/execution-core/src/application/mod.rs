//! Application Layer
//!
//! The application layer orchestrates domain logic through use cases.
//! It defines:
//!
//! - **Ports**: Interfaces to the venue, the message bus and the risk gate
//! - **Services**: The exactly-once fill applier and the worker pool
//! - **Use Cases**: Approval, execution and account reconciliation
//! - **DTOs**: Message envelope and bus payloads

pub mod dto;
pub mod ports;
pub mod services;
pub mod use_cases;

pub use dto::*;
pub use ports::*;
pub use services::*;
pub use use_cases::*;
