//! Error aggregation at the coordinator boundary.
//!
//! Each layer owns a closed error enum. [`ExecutionError`] gathers them where
//! an order's outcome is decided and classifies each failure exactly once.
//!
//! # Codes
//!
//! | Code | Category | Source |
//! |------|----------|--------|
//! | `CONNECTION_FAILED` | Retryable | venue unreachable |
//! | `RATE_LIMIT_EXCEEDED` | RateLimited | venue throttling |
//! | `ORDER_REJECTED` | Retryable if transient | venue refusal |
//! | `NOT_CONNECTED`, `ORDER_NOT_FOUND`, `ORDER_ALREADY_EXECUTED`, `AUTHENTICATION_FAILED` | NonRetryable | venue |
//! | `PERSISTENCE_UNAVAILABLE` | Retryable | repository |
//! | `INSUFFICIENT_QUANTITY`, `POSITION_NOT_FOUND`, ... | NonRetryable | portfolio |
//! | `INVARIANT_VIOLATION` | NonRetryable | illegal order transition |
//! | `TIMEOUT` | NonRetryable | monitoring deadline |
//! | `INTERRUPTED` | NonRetryable | shutdown deadline |

use thiserror::Error;

use crate::application::ports::{BrokerError, MessageBusError, RiskGateError};
use crate::broker::{ErrorCategory, Retryable};
use crate::domain::order_execution::OrderError;
use crate::domain::portfolio::PortfolioError;
use crate::domain::shared::RepositoryError;

/// Any failure that can end an order's processing.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Venue call failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Fill could not be applied to the portfolio.
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    /// Persistence failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Publishing failed.
    #[error(transparent)]
    MessageBus(#[from] MessageBusError),

    /// Risk gate could not evaluate the order.
    #[error(transparent)]
    RiskGate(#[from] RiskGateError),

    /// Order terms are invalid.
    #[error("Invalid order: {0}")]
    InvalidOrder(OrderError),

    /// An illegal lifecycle transition was attempted.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Order did not reach a terminal state before the deadline.
    #[error("Order timed out after {after_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        after_ms: u64,
    },

    /// Processing abandoned during shutdown.
    #[error("Order processing interrupted")]
    Interrupted,
}

impl From<OrderError> for ExecutionError {
    fn from(err: OrderError) -> Self {
        if err.is_invariant_violation() {
            Self::InvariantViolation(err.to_string())
        } else {
            Self::InvalidOrder(err)
        }
    }
}

impl ExecutionError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Broker(e) => e.code(),
            Self::Portfolio(e) => e.code(),
            Self::Repository(RepositoryError::NotFound { .. }) => "NOT_FOUND",
            Self::Repository(RepositoryError::AlreadyExists { .. }) => "ALREADY_EXISTS",
            Self::Repository(RepositoryError::Unavailable(_)) => "PERSISTENCE_UNAVAILABLE",
            Self::MessageBus(_) => "MESSAGE_BUS_ERROR",
            Self::RiskGate(_) => "RISK_GATE_UNAVAILABLE",
            Self::InvalidOrder(_) => "INVALID_ORDER",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    /// Returns true for programming errors that must never be retried.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

impl Retryable for ExecutionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Broker(e) => e.category(),
            Self::Repository(e) => e.category(),
            Self::MessageBus(e) => e.category(),
            Self::RiskGate(RiskGateError::Unavailable(_)) => ErrorCategory::Retryable,
            Self::Portfolio(_)
            | Self::InvalidOrder(_)
            | Self::InvariantViolation(_)
            | Self::Timeout { .. }
            | Self::Interrupted => ErrorCategory::NonRetryable,
        }
    }
}

impl Retryable for RepositoryError {
    fn category(&self) -> ErrorCategory {
        if self.is_retryable() {
            ErrorCategory::Retryable
        } else {
            ErrorCategory::NonRetryable
        }
    }
}
