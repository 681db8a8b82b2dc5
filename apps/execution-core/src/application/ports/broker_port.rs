//! Broker Port (Driven Port)
//!
//! Interface for placing and tracking orders at an execution venue.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::broker::{ErrorCategory, Retryable};
use crate::domain::order_execution::{Order, OrderStatus};
use crate::domain::shared::{BrokerOrderId, Symbol, Timestamp};

/// One execution reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Fee charged for this execution.
    pub fee: Decimal,
    /// When the execution happened.
    pub timestamp: Timestamp,
}

impl Fill {
    /// Notional value of the fill (`price * quantity`).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Venue response to a placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    /// Broker-assigned order ID.
    pub broker_order_id: BrokerOrderId,
    /// Status right after placement. `Pending` normally, `Executed` for
    /// venues that fill synchronously.
    pub status: OrderStatus,
    /// Fills reported inline, if any.
    #[serde(default)]
    pub fills: Vec<Fill>,
    /// When the venue accepted the order.
    pub submitted_at: Timestamp,
}

impl OrderResult {
    /// Returns true if the venue already reports a final outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// View this placement result as a status report.
    #[must_use]
    pub fn into_report(self, requested_quantity: Decimal) -> OrderStatusReport {
        OrderStatusReport::new(
            self.broker_order_id,
            self.status,
            requested_quantity,
            self.fills,
            None,
        )
    }
}

/// Current state of an order as seen by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    /// Broker-assigned order ID.
    pub broker_order_id: BrokerOrderId,
    /// Last status reported by the venue.
    pub status: OrderStatus,
    /// Quantity originally requested.
    pub requested_quantity: Decimal,
    /// All fills so far, oldest first.
    pub fills: Vec<Fill>,
    /// Sum of fill quantities.
    pub executed_quantity: Decimal,
    /// `requested_quantity - executed_quantity`.
    pub remaining_quantity: Decimal,
    /// Volume-weighted average fill price, if anything filled.
    pub average_price: Option<Decimal>,
    /// Sum of fill fees.
    pub total_fees: Decimal,
    /// Venue reason for a reject or cancel.
    pub reason: Option<String>,
}

impl OrderStatusReport {
    /// Build a report, deriving the aggregates from the fills.
    #[must_use]
    pub fn new(
        broker_order_id: BrokerOrderId,
        status: OrderStatus,
        requested_quantity: Decimal,
        fills: Vec<Fill>,
        reason: Option<String>,
    ) -> Self {
        let executed_quantity: Decimal = fills.iter().map(|f| f.quantity).sum();
        let notional: Decimal = fills.iter().map(Fill::notional).sum();
        let total_fees: Decimal = fills.iter().map(|f| f.fee).sum();
        let average_price = (executed_quantity > Decimal::ZERO).then(|| notional / executed_quantity);

        Self {
            broker_order_id,
            status,
            requested_quantity,
            fills,
            executed_quantity,
            remaining_quantity: requested_quantity - executed_quantity,
            average_price,
            total_fees,
            reason,
        }
    }

    /// Returns true if the venue reports a final outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A position as the venue sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    /// Instrument.
    pub symbol: Symbol,
    /// Net quantity held.
    pub quantity: Decimal,
    /// Average entry price.
    pub average_price: Decimal,
}

/// Venue-side view of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Cash balance.
    pub cash: Decimal,
    /// Buying power.
    pub buying_power: Decimal,
    /// Open positions.
    pub positions: Vec<AccountPosition>,
    /// When the snapshot was taken.
    pub as_of: Timestamp,
}

impl AccountSnapshot {
    /// Quantity held in `symbol`, zero if none.
    #[must_use]
    pub fn quantity(&self, symbol: &Symbol) -> Decimal {
        self.positions
            .iter()
            .find(|p| &p.symbol == symbol)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }
}

/// Broker port error.
///
/// Every variant maps to one stable venue code (see [`BrokerError::code`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Could not reach the venue.
    #[error("CONNECTION_FAILED: {message}")]
    ConnectionFailed {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },

    /// Call made without an open session.
    #[error("NOT_CONNECTED: {message}")]
    NotConnected {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },

    /// Venue refused the order.
    #[error("ORDER_REJECTED: {message}")]
    OrderRejected {
        /// Rejection reason.
        message: String,
        /// Whether the venue considers the condition temporary.
        transient: bool,
        /// Extra context.
        details: Option<String>,
    },

    /// Unknown broker order ID.
    #[error("ORDER_NOT_FOUND: {message}")]
    OrderNotFound {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },

    /// Order already filled, cannot be changed.
    #[error("ORDER_ALREADY_EXECUTED: {message}")]
    OrderAlreadyExecuted {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },

    /// Too many requests.
    #[error("RATE_LIMIT_EXCEEDED: {message}")]
    RateLimitExceeded {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },

    /// Credentials refused.
    #[error("AUTHENTICATION_FAILED: {message}")]
    AuthenticationFailed {
        /// Error details.
        message: String,
        /// Extra context.
        details: Option<String>,
    },
}

impl BrokerError {
    /// Connection failure.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            details: None,
        }
    }

    /// Call without an open session.
    #[must_use]
    pub fn not_connected() -> Self {
        Self::NotConnected {
            message: "broker session is not connected".to_string(),
            details: None,
        }
    }

    /// Venue rejection.
    pub fn order_rejected(message: impl Into<String>, transient: bool) -> Self {
        Self::OrderRejected {
            message: message.into(),
            transient,
            details: None,
        }
    }

    /// Unknown order.
    #[must_use]
    pub fn order_not_found(broker_order_id: &BrokerOrderId) -> Self {
        Self::OrderNotFound {
            message: format!("order {broker_order_id} not found"),
            details: None,
        }
    }

    /// Order already filled.
    #[must_use]
    pub fn order_already_executed(broker_order_id: &BrokerOrderId) -> Self {
        Self::OrderAlreadyExecuted {
            message: format!("order {broker_order_id} already executed"),
            details: None,
        }
    }

    /// Rate limited.
    pub fn rate_limit_exceeded(message: impl Into<String>) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            details: None,
        }
    }

    /// Credentials refused.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
            details: None,
        }
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn with_details(mut self, detail: impl Into<String>) -> Self {
        let slot = match &mut self {
            Self::ConnectionFailed { details, .. }
            | Self::NotConnected { details, .. }
            | Self::OrderRejected { details, .. }
            | Self::OrderNotFound { details, .. }
            | Self::OrderAlreadyExecuted { details, .. }
            | Self::RateLimitExceeded { details, .. }
            | Self::AuthenticationFailed { details, .. } => details,
        };
        *slot = Some(detail.into());
        self
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::NotConnected { .. } => "NOT_CONNECTED",
            Self::OrderRejected { .. } => "ORDER_REJECTED",
            Self::OrderNotFound { .. } => "ORDER_NOT_FOUND",
            Self::OrderAlreadyExecuted { .. } => "ORDER_ALREADY_EXECUTED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
        }
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::ConnectionFailed { message, .. }
            | Self::NotConnected { message, .. }
            | Self::OrderRejected { message, .. }
            | Self::OrderNotFound { message, .. }
            | Self::OrderAlreadyExecuted { message, .. }
            | Self::RateLimitExceeded { message, .. }
            | Self::AuthenticationFailed { message, .. } => message,
        }
    }

    /// Free-form detail, if any.
    #[must_use]
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { details, .. }
            | Self::NotConnected { details, .. }
            | Self::OrderRejected { details, .. }
            | Self::OrderNotFound { details, .. }
            | Self::OrderAlreadyExecuted { details, .. }
            | Self::RateLimitExceeded { details, .. }
            | Self::AuthenticationFailed { details, .. } => details.as_deref(),
        }
    }
}

impl Retryable for BrokerError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed { .. } => ErrorCategory::Retryable,
            Self::OrderRejected { transient: true, .. } => ErrorCategory::Retryable,
            Self::RateLimitExceeded { .. } => ErrorCategory::RateLimited,
            Self::NotConnected { .. }
            | Self::OrderRejected { transient: false, .. }
            | Self::OrderNotFound { .. }
            | Self::OrderAlreadyExecuted { .. }
            | Self::AuthenticationFailed { .. } => ErrorCategory::NonRetryable,
        }
    }
}

/// Port for broker interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Open the venue session.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Close the venue session.
    async fn disconnect(&self) -> Result<(), BrokerError>;

    /// Submit an order.
    async fn place_order(&self, order: &Order) -> Result<OrderResult, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError>;

    /// Read the current status and fills of an order. Has no side effects.
    async fn get_order_status(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<OrderStatusReport, BrokerError>;

    /// Venue-side account view.
    async fn get_account_info(&self) -> Result<AccountSnapshot, BrokerError>;

    /// Returns true while a session is open.
    fn is_connected(&self) -> bool;

    /// Venue name, used in logs and published events.
    fn name(&self) -> &str;
}
