//! Net holding in a single symbol.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::PortfolioError;
use crate::domain::shared::{Symbol, Timestamp};

/// A long position in one symbol.
///
/// The average price is derived from a running cost basis so that a run of
/// increases yields the size-weighted mean of their fills regardless of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    symbol: Symbol,
    quantity: Decimal,
    average_price: Decimal,
    cost_basis: Decimal,
    mark_price: Decimal,
    unrealized_pnl: Decimal,
    realized_pnl: Decimal,
    opened_at: Timestamp,
    updated_at: Timestamp,
}

impl Position {
    pub(super) fn open(symbol: Symbol, quantity: Decimal, price: Decimal) -> Self {
        let now = Timestamp::now();
        Self {
            symbol,
            quantity,
            average_price: price,
            cost_basis: quantity * price,
            mark_price: price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            opened_at: now,
            updated_at: now,
        }
    }

    /// Blend a fill into the position.
    pub(super) fn increase(&mut self, quantity: Decimal, price: Decimal) {
        self.cost_basis += quantity * price;
        self.quantity += quantity;
        self.average_price = self.cost_basis / self.quantity;
        self.mark(price);
    }

    /// Close part of the position, returning the realized P&L.
    ///
    /// The average price is unchanged.
    pub(super) fn decrease(
        &mut self,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Decimal, PortfolioError> {
        if quantity > self.quantity {
            return Err(PortfolioError::InsufficientQuantity {
                symbol: self.symbol.clone(),
                requested: quantity,
                held: self.quantity,
            });
        }

        let realized = (price - self.average_price) * quantity;
        self.realized_pnl += realized;
        self.quantity -= quantity;
        self.cost_basis = self.average_price * self.quantity;
        self.mark(price);
        Ok(realized)
    }

    /// Revalue at a new market price.
    pub(super) fn mark(&mut self, price: Decimal) {
        self.mark_price = price;
        self.unrealized_pnl = (price - self.average_price) * self.quantity;
        self.updated_at = Timestamp::now();
    }

    /// Traded symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Held quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Volume-weighted average entry price.
    #[must_use]
    pub const fn average_price(&self) -> Decimal {
        self.average_price
    }

    /// Last mark price.
    #[must_use]
    pub const fn mark_price(&self) -> Decimal {
        self.mark_price
    }

    /// Quantity valued at the mark price.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.mark_price
    }

    /// Mark-to-market P&L on the open quantity.
    #[must_use]
    pub const fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pnl
    }

    /// Cumulative realized P&L on this symbol since the position opened.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// When the position was opened.
    #[must_use]
    pub const fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// True when nothing is held.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}
