//! Payloads consumed from and published to the bus.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::envelope::MessageEnvelope;
use crate::application::ports::Fill;
use crate::domain::order_execution::{Order, OrderError, OrderStatus};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::shared::{BrokerOrderId, PortfolioId, Symbol, Timestamp};

/// Published on `order.executed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedOrderMessage {
    /// The order, in `EXECUTED` state.
    pub order: Order,
    /// Venue identifier of the order.
    pub broker_order_id: BrokerOrderId,
    /// Individual executions.
    pub fills: Vec<Fill>,
    /// Total fees charged.
    pub fees: Decimal,
    /// Venue name.
    pub broker: String,
}

/// Published on `order.failed` and `order.rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailedMessage {
    /// The order, in `REJECTED` or `CANCELLED` state.
    pub order: Order,
    /// Human-readable reason.
    pub reason: String,
    /// Code of the error that caused the give-up.
    pub error_code: String,
    /// Attempts consumed before giving up.
    pub retry_count: u32,
    /// Venue identifier, when placement succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<BrokerOrderId>,
    /// Quantity the venue filled before the order ended. Those fills are
    /// booked into the portfolio.
    #[serde(default)]
    pub filled_quantity: Decimal,
}

/// Published on `portfolio.update` after every applied fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioUpdateMessage {
    /// Portfolio identifier.
    pub portfolio_id: PortfolioId,
    /// Cash balance.
    pub cash: Decimal,
    /// `cash + Σ market value`.
    pub total_value: Decimal,
    /// Cumulative realized P&L.
    pub realized_pnl: Decimal,
    /// Open mark-to-market P&L.
    pub unrealized_pnl: Decimal,
    /// Held quantity per symbol.
    pub positions: BTreeMap<Symbol, Decimal>,
    /// Snapshot time.
    pub timestamp: Timestamp,
}

impl From<PortfolioSnapshot> for PortfolioUpdateMessage {
    fn from(snapshot: PortfolioSnapshot) -> Self {
        Self {
            portfolio_id: snapshot.portfolio_id,
            cash: snapshot.cash,
            total_value: snapshot.total_value,
            realized_pnl: snapshot.realized_pnl,
            unrealized_pnl: snapshot.unrealized_pnl,
            positions: snapshot.positions,
            timestamp: snapshot.timestamp,
        }
    }
}

/// Why an inbound approved-order message was discarded.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Not an order, enveloped or bare.
    #[error("Malformed order message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed but not in `APPROVED` state.
    #[error("Expected APPROVED order, got {0}")]
    UnexpectedStatus(OrderStatus),

    /// Order fields fail validation.
    #[error(transparent)]
    Invalid(#[from] OrderError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApprovedPayload {
    Envelope(MessageEnvelope<Order>),
    Bare(Order),
}

/// Decode an approved order from a bus payload.
///
/// Accepts either a `MessageEnvelope<Order>` or a bare order object.
///
/// # Errors
///
/// Returns an [`IntakeError`] if the payload is not an order, the order is
/// not `APPROVED`, or its fields are invalid.
pub fn decode_approved_order(payload: serde_json::Value) -> Result<Order, IntakeError> {
    let order = match serde_json::from_value(payload)? {
        ApprovedPayload::Envelope(envelope) => envelope.data,
        ApprovedPayload::Bare(order) => order,
    };

    if order.status() != OrderStatus::Approved {
        return Err(IntakeError::UnexpectedStatus(order.status()));
    }
    order.validate()?;
    Ok(order)
}
