//! Reconcile Account Use Case
//!
//! Read-only comparison of the venue's account view with the portfolio.
//! Neither side is corrected; the report is for operators and alerts.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::ports::{AccountSnapshot, BrokerError, BrokerPort};
use crate::application::services::FillApplier;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::shared::{Symbol, Timestamp};

/// One difference between the venue and the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Cash balances differ by more than the tolerance.
    CashDrift {
        /// Venue cash.
        venue: Decimal,
        /// Portfolio cash.
        portfolio: Decimal,
    },
    /// Both sides hold the symbol in different quantities.
    QuantityMismatch {
        /// Instrument.
        symbol: Symbol,
        /// Venue quantity.
        venue: Decimal,
        /// Portfolio quantity.
        portfolio: Decimal,
    },
    /// Held at the venue only.
    MissingInPortfolio {
        /// Instrument.
        symbol: Symbol,
        /// Venue quantity.
        venue: Decimal,
    },
    /// Held in the portfolio only.
    MissingAtVenue {
        /// Instrument.
        symbol: Symbol,
        /// Portfolio quantity.
        portfolio: Decimal,
    },
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// `venue cash - portfolio cash`.
    pub cash_drift: Decimal,
    /// Differences beyond the tolerance, cash first then by symbol.
    pub discrepancies: Vec<Discrepancy>,
    /// Symbols compared.
    pub symbols_checked: usize,
    /// When the comparison ran.
    pub checked_at: Timestamp,
}

impl ReconciliationReport {
    /// Returns true if both ledgers agree within tolerance.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Compare two ledger views.
///
/// Differences at or below `tolerance` (absolute, in cash or share units)
/// are ignored.
#[must_use]
pub fn compare_ledgers(
    venue: &AccountSnapshot,
    portfolio: &PortfolioSnapshot,
    tolerance: Decimal,
) -> ReconciliationReport {
    let tolerance = tolerance.abs();
    let mut discrepancies = Vec::new();

    let cash_drift = venue.cash - portfolio.cash;
    if cash_drift.abs() > tolerance {
        discrepancies.push(Discrepancy::CashDrift {
            venue: venue.cash,
            portfolio: portfolio.cash,
        });
    }

    let symbols: BTreeSet<&Symbol> = venue
        .positions
        .iter()
        .map(|p| &p.symbol)
        .chain(portfolio.positions.keys())
        .collect();

    for symbol in &symbols {
        let at_venue = venue.positions.iter().find(|p| &p.symbol == *symbol);
        let in_portfolio = portfolio.positions.get(*symbol);

        match (at_venue, in_portfolio) {
            (Some(v), Some(&p)) if (v.quantity - p).abs() > tolerance => {
                discrepancies.push(Discrepancy::QuantityMismatch {
                    symbol: (*symbol).clone(),
                    venue: v.quantity,
                    portfolio: p,
                });
            }
            (Some(v), None) if v.quantity.abs() > tolerance => {
                discrepancies.push(Discrepancy::MissingInPortfolio {
                    symbol: (*symbol).clone(),
                    venue: v.quantity,
                });
            }
            (None, Some(&p)) if p.abs() > tolerance => {
                discrepancies.push(Discrepancy::MissingAtVenue {
                    symbol: (*symbol).clone(),
                    portfolio: p,
                });
            }
            _ => {}
        }
    }

    ReconciliationReport {
        cash_drift,
        discrepancies,
        symbols_checked: symbols.len(),
        checked_at: Timestamp::now(),
    }
}

/// Use case for reconciling the portfolio with the venue account.
pub struct ReconcileAccountUseCase<B>
where
    B: BrokerPort,
{
    broker: Arc<B>,
    portfolio: Arc<FillApplier>,
    tolerance: Decimal,
}

impl<B> ReconcileAccountUseCase<B>
where
    B: BrokerPort,
{
    /// Create a new `ReconcileAccountUseCase`.
    pub const fn new(broker: Arc<B>, portfolio: Arc<FillApplier>, tolerance: Decimal) -> Self {
        Self {
            broker,
            portfolio,
            tolerance,
        }
    }

    /// Fetch the venue account and compare it with the portfolio.
    ///
    /// # Errors
    ///
    /// Returns the [`BrokerError`] if the account cannot be read.
    pub async fn execute(&self) -> Result<ReconciliationReport, BrokerError> {
        let account = self.broker.get_account_info().await?;
        let report = compare_ledgers(&account, &self.portfolio.snapshot(), self.tolerance);

        if report.is_clean() {
            info!(symbols = report.symbols_checked, "Account reconciled");
        } else {
            warn!(
                discrepancies = report.discrepancies.len(),
                cash_drift = %report.cash_drift,
                "Account out of sync with venue"
            );
        }
        Ok(report)
    }
}
