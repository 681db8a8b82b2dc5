//! Venue-side account ledger.
//!
//! Mirrors what a real venue would report for the account. It is never read
//! by the coordinator's portfolio accounting, only by `get_account_info`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::application::ports::{AccountPosition, AccountSnapshot};
use crate::domain::order_execution::OrderSide;
use crate::domain::shared::{Symbol, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Holding {
    quantity: Decimal,
    average_price: Decimal,
}

/// Cash and holdings as the venue books them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueLedger {
    cash: Decimal,
    holdings: BTreeMap<Symbol, Holding>,
}

impl VenueLedger {
    /// Open an account with `cash`.
    #[must_use]
    pub const fn new(cash: Decimal) -> Self {
        Self {
            cash,
            holdings: BTreeMap::new(),
        }
    }

    /// Cash balance.
    #[must_use]
    pub const fn cash(&self) -> Decimal {
        self.cash
    }

    /// Book one execution.
    pub fn apply(
        &mut self,
        side: OrderSide,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) {
        let notional = quantity * price;
        let signed = match side {
            OrderSide::Buy => {
                self.cash -= notional + fee;
                quantity
            }
            OrderSide::Sell => {
                self.cash += notional - fee;
                -quantity
            }
        };

        let holding = self.holdings.entry(symbol.clone()).or_insert(Holding {
            quantity: Decimal::ZERO,
            average_price: price,
        });
        let new_quantity = holding.quantity + signed;

        // Adding in the direction of the holding blends the average.
        let same_direction = holding.quantity.is_zero()
            || holding.quantity.is_sign_positive() == signed.is_sign_positive();
        if same_direction && !new_quantity.is_zero() {
            holding.average_price = (holding.quantity.abs() * holding.average_price
                + quantity * price)
                / new_quantity.abs();
        } else if !new_quantity.is_zero()
            && new_quantity.is_sign_positive() != holding.quantity.is_sign_positive()
        {
            // Flipped through flat: the remainder opened at this price.
            holding.average_price = price;
        }
        holding.quantity = new_quantity;

        if holding.quantity.is_zero() {
            self.holdings.remove(symbol);
        }
    }

    /// Account view as of now.
    #[must_use]
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            cash: self.cash,
            buying_power: self.cash,
            positions: self
                .holdings
                .iter()
                .map(|(symbol, h)| AccountPosition {
                    symbol: symbol.clone(),
                    quantity: h.quantity,
                    average_price: h.average_price,
                })
                .collect(),
            as_of: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_debits_cash_plus_fee() {
        let mut ledger = VenueLedger::new(dec!(100000));
        let aapl = Symbol::new("AAPL");
        ledger.apply(OrderSide::Buy, &aapl, dec!(100), dec!(150), dec!(1));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.cash, dec!(84999));
        assert_eq!(snapshot.buying_power, dec!(84999));
        assert_eq!(snapshot.quantity(&aapl), dec!(100));
    }

    #[test]
    fn buys_blend_average_and_sells_keep_it() {
        let mut ledger = VenueLedger::new(dec!(0));
        let aapl = Symbol::new("AAPL");
        ledger.apply(OrderSide::Buy, &aapl, dec!(10), dec!(100), dec!(0));
        ledger.apply(OrderSide::Buy, &aapl, dec!(10), dec!(200), dec!(0));
        ledger.apply(OrderSide::Sell, &aapl, dec!(5), dec!(300), dec!(0));

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.positions[0].quantity, dec!(15));
        assert_eq!(snapshot.positions[0].average_price, dec!(150));
        assert_eq!(snapshot.cash, dec!(-1500));
    }

    #[test]
    fn closing_removes_holding() {
        let mut ledger = VenueLedger::new(dec!(1000));
        let aapl = Symbol::new("AAPL");
        ledger.apply(OrderSide::Buy, &aapl, dec!(2), dec!(10), dec!(1));
        ledger.apply(OrderSide::Sell, &aapl, dec!(2), dec!(12), dec!(1));

        let snapshot = ledger.snapshot();
        assert!(snapshot.positions.is_empty());
        assert_eq!(snapshot.cash, dec!(1002));
    }
}
