//! Order State Machine Service
//!
//! The lifecycle graph is fixed:
//!
//! ```text
//! PENDING ──► APPROVED ──► EXECUTED
//!    │            ├──────► REJECTED
//!    └────────────┴──────► CANCELLED
//! ```

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::value_objects::OrderStatus;

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::Pending, OrderStatus::Approved | OrderStatus::Cancelled)
                | (
                    OrderStatus::Approved,
                    OrderStatus::Executed | OrderStatus::Rejected | OrderStatus::Cancelled
                )
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the edge is not in the graph.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Executed => format!("Order is already executed, cannot transition to {to}"),
            OrderStatus::Cancelled => format!("Order is cancelled, cannot transition to {to}"),
            OrderStatus::Rejected => format!("Order was rejected, cannot transition to {to}"),
            OrderStatus::Pending if to == OrderStatus::Executed => {
                "Order must be approved before execution".to_string()
            }
            _ => format!("Invalid transition from {from} to {to}"),
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![OrderStatus::Approved, OrderStatus::Cancelled],
            OrderStatus::Approved => vec![
                OrderStatus::Executed,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Executed | OrderStatus::Rejected | OrderStatus::Cancelled => vec![],
        }
    }
}
