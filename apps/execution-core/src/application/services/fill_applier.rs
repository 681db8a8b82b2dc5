//! Fill Applier
//!
//! Single owner of the in-memory portfolio. Applies venue fills exactly once
//! per broker order id, under one short critical section that covers both the
//! processed-set check and the portfolio read-modify-write.
//!
//! The processed set remembers the most recent [`DEFAULT_ID_WINDOW`] broker
//! order ids. A report for an id older than that would be booked again, so
//! the window must stay far larger than the number of orders that can still
//! be redelivered.

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{Fill, OrderStatusReport};
use crate::application::services::{DEFAULT_ID_WINDOW, RecentIds};
use crate::domain::order_execution::Order;
use crate::domain::portfolio::{Portfolio, PortfolioError, PortfolioSnapshot};
use crate::domain::shared::{BrokerOrderId, Symbol, Timestamp};

/// What happened when a terminal report was offered to the portfolio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// Fills were booked.
    Applied {
        /// Realized P&L produced by these fills.
        realized_pnl: Decimal,
        /// Portfolio state right after booking.
        snapshot: PortfolioSnapshot,
    },
    /// This broker order was already booked; nothing changed.
    AlreadyApplied,
}

struct Ledger {
    portfolio: Portfolio,
    processed: RecentIds<BrokerOrderId>,
}

/// Exactly-once bridge between venue fills and the portfolio.
pub struct FillApplier {
    ledger: Mutex<Ledger>,
}

impl FillApplier {
    /// Take ownership of `portfolio`.
    #[must_use]
    pub fn new(portfolio: Portfolio) -> Self {
        Self::with_id_window(portfolio, DEFAULT_ID_WINDOW)
    }

    /// Take ownership of `portfolio`, remembering at most `window` booked
    /// broker order ids.
    #[must_use]
    pub fn with_id_window(portfolio: Portfolio, window: usize) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                portfolio,
                processed: RecentIds::new(window),
            }),
        }
    }

    /// Book the fills of `report` for `order`.
    ///
    /// Normally called with a terminal `EXECUTED` report. A report for an
    /// order that ended without executing books whatever filled before the
    /// end. All fills of the report land together or not at all. A report whose
    /// broker order id was already booked is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortfolioError`] raised by a fill, e.g. a sell
    /// larger than the held quantity. The portfolio is left untouched and the
    /// id is not marked as processed.
    pub fn apply(
        &self,
        order: &Order,
        report: &OrderStatusReport,
    ) -> Result<FillOutcome, PortfolioError> {
        let fills = effective_fills(report);

        let mut ledger = self.ledger.lock();
        if ledger.processed.contains(&report.broker_order_id) {
            return Ok(FillOutcome::AlreadyApplied);
        }

        let mut next = ledger.portfolio.clone();
        let mut realized_pnl = Decimal::ZERO;
        for fill in &fills {
            realized_pnl += next.apply_fill(
                order.side(),
                order.symbol(),
                fill.quantity,
                fill.price,
                fill.fee,
            )?;
        }

        let snapshot = next.snapshot();
        ledger.portfolio = next;
        ledger.processed.insert(report.broker_order_id.clone());

        Ok(FillOutcome::Applied {
            realized_pnl,
            snapshot,
        })
    }

    /// Returns true if fills for this broker order were already booked.
    #[must_use]
    pub fn is_processed(&self, broker_order_id: &BrokerOrderId) -> bool {
        self.ledger.lock().processed.contains(broker_order_id)
    }

    /// Revalue a held position. No cash effect.
    ///
    /// # Errors
    ///
    /// Propagates [`PortfolioError`] from the portfolio.
    pub fn mark_price(&self, symbol: &Symbol, price: Decimal) -> Result<(), PortfolioError> {
        self.ledger.lock().portfolio.mark_price(symbol, price)
    }

    /// Point-in-time read-only view.
    #[must_use]
    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.ledger.lock().portfolio.snapshot()
    }

    /// Copy of the current portfolio, for persistence.
    #[must_use]
    pub fn portfolio(&self) -> Portfolio {
        self.ledger.lock().portfolio.clone()
    }
}

// A venue may report EXECUTED with aggregates only; book that as one fill.
fn effective_fills(report: &OrderStatusReport) -> Vec<Fill> {
    if !report.fills.is_empty() {
        return report.fills.clone();
    }
    match report.average_price {
        Some(price) if report.executed_quantity > Decimal::ZERO => vec![Fill {
            price,
            quantity: report.executed_quantity,
            fee: report.total_fees,
            timestamp: Timestamp::now(),
        }],
        _ => Vec::new(),
    }
}
