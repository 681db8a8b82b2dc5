//! Portfolio Repository Trait

use async_trait::async_trait;

use super::aggregate::Portfolio;
use crate::domain::shared::{PortfolioId, RepositoryError};

/// Persistence abstraction for portfolios.
#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    /// Insert or replace a portfolio.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store cannot be reached.
    async fn save(&self, portfolio: &Portfolio) -> Result<(), RepositoryError>;

    /// Load a portfolio by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn get(&self, id: &PortfolioId) -> Result<Option<Portfolio>, RepositoryError>;

    /// Persist the positions and balances of an existing portfolio.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the portfolio was never saved.
    async fn update_positions(&self, portfolio: &Portfolio) -> Result<(), RepositoryError>;
}
