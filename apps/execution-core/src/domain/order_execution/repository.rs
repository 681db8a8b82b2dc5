//! Order Repository Trait
//!
//! Defines the persistence abstraction for orders.
//! Implemented by adapters in the infrastructure layer.

use async_trait::async_trait;

use super::aggregate::Order;
use super::value_objects::{OrderSide, OrderStatus};
use crate::domain::shared::{OrderId, RepositoryError, Symbol, Timestamp};

/// Filter set for listing orders. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only orders for this symbol.
    pub symbol: Option<Symbol>,
    /// Only orders in this status.
    pub status: Option<OrderStatus>,
    /// Only orders on this side.
    pub side: Option<OrderSide>,
    /// Only orders created at or after this time.
    pub created_from: Option<Timestamp>,
    /// Only orders created at or before this time.
    pub created_to: Option<Timestamp>,
    /// Maximum number of results (0 = unlimited).
    pub limit: usize,
    /// Number of matching results to skip.
    pub offset: usize,
}

impl OrderFilter {
    /// Filter on status.
    #[must_use]
    pub const fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter on symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<Symbol>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Filter on side.
    #[must_use]
    pub const fn with_side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Paginate results.
    #[must_use]
    pub const fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// True if the order satisfies every populated criterion.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.symbol.as_ref().is_none_or(|s| s == order.symbol())
            && self.status.is_none_or(|s| s == order.status())
            && self.side.is_none_or(|s| s == order.side())
            && self.created_from.is_none_or(|t| order.created_at() >= t)
            && self.created_to.is_none_or(|t| order.created_at() <= t)
    }
}

/// Repository trait for Order persistence.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the id is taken, or `Unavailable` if the
    /// store cannot be reached.
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Find an order by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Replace a stored order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order was never created.
    async fn update(&self, order: &Order) -> Result<(), RepositoryError>;

    /// List orders matching a filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    /// Delete an order by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist.
    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError>;
}
