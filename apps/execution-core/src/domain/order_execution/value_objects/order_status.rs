//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// `PENDING` is initial. `EXECUTED`, `REJECTED` and `CANCELLED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting the risk gate.
    Pending,
    /// Approved for execution.
    Approved,
    /// Filled at the venue.
    Executed,
    /// Rejected by the venue or given up on by the coordinator.
    Rejected,
    /// Cancelled before execution.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected | Self::Cancelled)
    }

    /// Returns true if the order may still be cancelled.
    #[must_use]
    pub const fn is_cancelable(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Executed => "EXECUTED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OrderStatus::Pending, false)]
    #[test_case(OrderStatus::Approved, false)]
    #[test_case(OrderStatus::Executed, true)]
    #[test_case(OrderStatus::Rejected, true)]
    #[test_case(OrderStatus::Cancelled, true)]
    fn terminal_states(status: OrderStatus, terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_cancelable(), !terminal);
    }

    #[test]
    fn status_serde_matches_display() {
        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, format!("\"{}\"", OrderStatus::Cancelled));
    }
}
