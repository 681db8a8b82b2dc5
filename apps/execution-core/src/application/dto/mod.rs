//! Data Transfer Objects
//!
//! Wire shapes for messages crossing the bus boundary.

mod envelope;
mod messages;

pub use envelope::MessageEnvelope;
pub use messages::{
    ExecutedOrderMessage, IntakeError, OrderFailedMessage, PortfolioUpdateMessage,
    decode_approved_order,
};
