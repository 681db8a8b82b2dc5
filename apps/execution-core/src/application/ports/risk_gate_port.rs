//! Risk Gate Port (Driven Port)
//!
//! Black-box pre-trade check that accepts or rejects a pending order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::Order;
use crate::domain::portfolio::PortfolioSnapshot;

/// Outcome of a risk check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RiskDecision {
    /// Order may proceed to execution.
    Approved,
    /// Order must not be executed.
    Rejected {
        /// Why the gate refused the order.
        reason: String,
    },
}

impl RiskDecision {
    /// Build a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns true if the order was approved.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Risk gate error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskGateError {
    /// The gate could not evaluate the order.
    #[error("Risk gate unavailable: {0}")]
    Unavailable(String),
}

/// Port for the risk gate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskGatePort: Send + Sync {
    /// Evaluate `order` against the current portfolio.
    async fn evaluate(
        &self,
        order: &Order,
        portfolio: &PortfolioSnapshot,
    ) -> Result<RiskDecision, RiskGateError>;
}
