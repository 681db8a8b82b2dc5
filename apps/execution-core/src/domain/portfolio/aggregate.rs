//! Portfolio Aggregate Root

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::PortfolioError;
use super::position::Position;
use crate::domain::order_execution::OrderSide;
use crate::domain::shared::{PortfolioId, Symbol, Timestamp};

/// Cash plus the set of open positions, owned by a single writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    id: PortfolioId,
    cash: Decimal,
    positions: BTreeMap<Symbol, Position>,
    realized_pnl: Decimal,
    total_fees: Decimal,
    total_value: Decimal,
    updated_at: Timestamp,
}

impl Portfolio {
    /// Create an empty portfolio funded with `initial_cash`.
    #[must_use]
    pub fn new(id: PortfolioId, initial_cash: Decimal) -> Self {
        Self {
            id,
            cash: initial_cash,
            positions: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            total_value: initial_cash,
            updated_at: Timestamp::now(),
        }
    }

    /// Buy `quantity` at `price`: debits cash and blends the average price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` or `InvalidPrice` for non-positive inputs.
    pub fn increase_position(
        &mut self,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<(), PortfolioError> {
        check_trade(quantity, price)?;

        match self.positions.get_mut(symbol) {
            Some(position) => position.increase(quantity, price),
            None => {
                self.positions
                    .insert(symbol.clone(), Position::open(symbol.clone(), quantity, price));
            }
        }
        self.cash -= quantity * price;
        self.recompute();
        Ok(())
    }

    /// Sell `quantity` at `price`: credits cash and realizes P&L against the
    /// average price. A position reaching zero is removed.
    ///
    /// # Errors
    ///
    /// Returns `PositionNotFound` when nothing is held, or
    /// `InsufficientQuantity` when the sale exceeds the holding. Either way
    /// the portfolio is untouched.
    pub fn decrease_position(
        &mut self,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Decimal, PortfolioError> {
        check_trade(quantity, price)?;

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| PortfolioError::PositionNotFound(symbol.clone()))?;
        let realized = position.decrease(quantity, price)?;

        if position.is_flat() {
            self.positions.remove(symbol);
        }
        self.cash += quantity * price;
        self.realized_pnl += realized;
        self.recompute();
        Ok(realized)
    }

    /// Revalue a held symbol. No cash effect; unknown symbols are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrice` for a non-positive price.
    pub fn mark_price(&mut self, symbol: &Symbol, price: Decimal) -> Result<(), PortfolioError> {
        if price <= Decimal::ZERO {
            return Err(PortfolioError::InvalidPrice(price));
        }
        if let Some(position) = self.positions.get_mut(symbol) {
            position.mark(price);
            self.recompute();
        }
        Ok(())
    }

    /// Debit a venue fee from cash.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFee` for a negative fee.
    pub fn charge_fee(&mut self, fee: Decimal) -> Result<(), PortfolioError> {
        if fee < Decimal::ZERO {
            return Err(PortfolioError::InvalidFee(fee));
        }
        self.cash -= fee;
        self.total_fees += fee;
        self.recompute();
        Ok(())
    }

    /// Apply one execution: the position change and its fee, atomically.
    ///
    /// Returns the realized P&L (zero for buys).
    ///
    /// # Errors
    ///
    /// Any error from the underlying mutation; nothing is applied in that case.
    pub fn apply_fill(
        &mut self,
        side: OrderSide,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) -> Result<Decimal, PortfolioError> {
        if fee < Decimal::ZERO {
            return Err(PortfolioError::InvalidFee(fee));
        }
        let realized = match side {
            OrderSide::Buy => {
                self.increase_position(symbol, quantity, price)?;
                Decimal::ZERO
            }
            OrderSide::Sell => self.decrease_position(symbol, quantity, price)?,
        };
        self.charge_fee(fee)?;
        Ok(realized)
    }

    /// Full recomputation of `cash + Σ market value`, independent of the
    /// cached total.
    #[must_use]
    pub fn computed_total_value(&self) -> Decimal {
        self.cash
            + self
                .positions
                .values()
                .map(Position::market_value)
                .sum::<Decimal>()
    }

    fn recompute(&mut self) {
        self.total_value = self.computed_total_value();
        self.updated_at = Timestamp::now();
    }

    /// Portfolio identifier.
    #[must_use]
    pub const fn id(&self) -> &PortfolioId {
        &self.id
    }

    /// Cash balance.
    #[must_use]
    pub const fn cash(&self) -> Decimal {
        self.cash
    }

    /// Total value as of the last mutation.
    #[must_use]
    pub const fn total_value(&self) -> Decimal {
        self.total_value
    }

    /// Cumulative realized P&L.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Sum of unrealized P&L across open positions.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    /// Cumulative venue fees paid.
    #[must_use]
    pub const fn total_fees(&self) -> Decimal {
        self.total_fees
    }

    /// Open positions keyed by symbol.
    #[must_use]
    pub const fn positions(&self) -> &BTreeMap<Symbol, Position> {
        &self.positions
    }

    /// Position in one symbol.
    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Last mutation time.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Summary suitable for publishing and risk checks.
    #[must_use]
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: self.id.clone(),
            cash: self.cash,
            total_value: self.total_value,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            total_fees: self.total_fees,
            positions: self
                .positions
                .iter()
                .map(|(symbol, p)| (symbol.clone(), p.quantity()))
                .collect(),
            market_values: self
                .positions
                .iter()
                .map(|(symbol, p)| (symbol.clone(), p.market_value()))
                .collect(),
            timestamp: self.updated_at,
        }
    }
}

fn check_trade(quantity: Decimal, price: Decimal) -> Result<(), PortfolioError> {
    if quantity <= Decimal::ZERO {
        return Err(PortfolioError::InvalidQuantity(quantity));
    }
    if price <= Decimal::ZERO {
        return Err(PortfolioError::InvalidPrice(price));
    }
    Ok(())
}

/// Read-only view of a portfolio at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Portfolio identifier.
    pub portfolio_id: PortfolioId,
    /// Cash balance.
    pub cash: Decimal,
    /// `cash + Σ market value`.
    pub total_value: Decimal,
    /// Cumulative realized P&L.
    pub realized_pnl: Decimal,
    /// Open mark-to-market P&L.
    pub unrealized_pnl: Decimal,
    /// Fees paid.
    pub total_fees: Decimal,
    /// Held quantity per symbol.
    pub positions: BTreeMap<Symbol, Decimal>,
    /// Market value per symbol.
    pub market_values: BTreeMap<Symbol, Decimal>,
    /// Snapshot time.
    pub timestamp: Timestamp,
}

impl PortfolioSnapshot {
    /// Held quantity of a symbol (zero when flat).
    #[must_use]
    pub fn quantity(&self, symbol: &Symbol) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or_default()
    }

    /// Market value of a symbol (zero when flat).
    #[must_use]
    pub fn market_value(&self, symbol: &Symbol) -> Decimal {
        self.market_values.get(symbol).copied().unwrap_or_default()
    }
}
