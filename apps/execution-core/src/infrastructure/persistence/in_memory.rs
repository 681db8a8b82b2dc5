//! In-memory repositories for development and testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::order_execution::{Order, OrderFilter, OrderRepository};
use crate::domain::portfolio::{Portfolio, PortfolioRepository};
use crate::domain::shared::{OrderId, PortfolioId, RepositoryError};

/// Counts down injected outages. Each call consumes one failure while any
/// remain.
#[derive(Debug, Default)]
struct FailureInjector {
    remaining: AtomicU32,
}

impl FailureInjector {
    fn arm(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        let consumed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(RepositoryError::Unavailable(
                "injected outage".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }
}

/// In-memory implementation of `OrderRepository`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
    outages: FailureInjector,
}

impl InMemoryOrderRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of orders in the repository.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Check if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Make the next `count` calls fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.outages.arm(count);
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        self.outages.check()?;
        let mut orders = self.orders.write();
        if orders.contains_key(order.id()) {
            return Err(RepositoryError::AlreadyExists {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        orders.insert(order.id().clone(), order.clone());
        Ok(())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        self.outages.check()?;
        Ok(self.orders.read().get(id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        self.outages.check()?;
        let mut orders = self.orders.write();
        let Some(slot) = orders.get_mut(order.id()) else {
            return Err(RepositoryError::NotFound {
                entity: "order",
                id: order.id().to_string(),
            });
        };
        *slot = order.clone();
        Ok(())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        self.outages.check()?;
        let orders = self.orders.read();
        let mut matching: Vec<Order> = orders.values().filter(|o| filter.matches(o)).cloned().collect();
        matching.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
        Ok(matching.into_iter().skip(filter.offset).take(limit).collect())
    }

    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        self.outages.check()?;
        self.orders
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "order",
                id: id.to_string(),
            })
    }
}

/// In-memory implementation of `PortfolioRepository`.
#[derive(Debug, Default)]
pub struct InMemoryPortfolioRepository {
    portfolios: RwLock<HashMap<PortfolioId, Portfolio>>,
    outages: FailureInjector,
}

impl InMemoryPortfolioRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with `Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.outages.arm(count);
    }
}

#[async_trait]
impl PortfolioRepository for InMemoryPortfolioRepository {
    async fn save(&self, portfolio: &Portfolio) -> Result<(), RepositoryError> {
        self.outages.check()?;
        self.portfolios
            .write()
            .insert(portfolio.id().clone(), portfolio.clone());
        Ok(())
    }

    async fn get(&self, id: &PortfolioId) -> Result<Option<Portfolio>, RepositoryError> {
        self.outages.check()?;
        Ok(self.portfolios.read().get(id).cloned())
    }

    async fn update_positions(&self, portfolio: &Portfolio) -> Result<(), RepositoryError> {
        self.outages.check()?;
        let mut portfolios = self.portfolios.write();
        let Some(slot) = portfolios.get_mut(portfolio.id()) else {
            return Err(RepositoryError::NotFound {
                entity: "portfolio",
                id: portfolio.id().to_string(),
            });
        };
        *slot = portfolio.clone();
        Ok(())
    }
}
