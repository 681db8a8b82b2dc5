//! Venue-side shadow of an order.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::application::ports::{Fill, OrderStatusReport};
use crate::domain::order_execution::{Order, OrderStatus};
use crate::domain::shared::{BrokerOrderId, Timestamp};

/// Violations of the shadow's own invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerOrderError {
    /// Fill would push the filled total past the requested quantity.
    #[error("Fill of {fill} would exceed requested {requested} (already filled {filled})")]
    Overfill {
        /// Requested quantity.
        requested: Decimal,
        /// Already filled.
        filled: Decimal,
        /// Rejected fill quantity.
        fill: Decimal,
    },

    /// The order already reached a final status.
    #[error("Order already {0}")]
    AlreadyTerminal(OrderStatus),

    /// Only terminal statuses can finish an order.
    #[error("{0} is not a terminal status")]
    NotTerminal(OrderStatus),
}

/// What the venue knows about one order: its fills and last status.
///
/// Fill quantities never sum past the requested quantity, and the status
/// turns terminal exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOrder {
    broker_order_id: BrokerOrderId,
    order: Order,
    status: OrderStatus,
    fills: Vec<Fill>,
    reason: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl BrokerOrder {
    /// Accept `order` under a fresh venue id, in `PENDING` state.
    #[must_use]
    pub fn accept(broker_order_id: BrokerOrderId, order: Order) -> Self {
        let now = Timestamp::now();
        Self {
            broker_order_id,
            order,
            status: OrderStatus::Pending,
            fills: Vec::new(),
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Venue id.
    #[must_use]
    pub const fn broker_order_id(&self) -> &BrokerOrderId {
        &self.broker_order_id
    }

    /// The order as submitted.
    #[must_use]
    pub const fn order(&self) -> &Order {
        &self.order
    }

    /// Current venue status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Fills so far.
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Acceptance time.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last change.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Sum of fill quantities.
    #[must_use]
    pub fn filled_quantity(&self) -> Decimal {
        self.fills.iter().map(|f| f.quantity).sum()
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.order.quantity() - self.filled_quantity()
    }

    /// Append a fill.
    ///
    /// # Errors
    ///
    /// `AlreadyTerminal` once the order is final, `Overfill` if the fill
    /// exceeds the remaining quantity.
    pub fn record_fill(&mut self, fill: Fill) -> Result<(), BrokerOrderError> {
        if self.status.is_terminal() {
            return Err(BrokerOrderError::AlreadyTerminal(self.status));
        }
        let filled = self.filled_quantity();
        if fill.quantity <= Decimal::ZERO || filled + fill.quantity > self.order.quantity() {
            return Err(BrokerOrderError::Overfill {
                requested: self.order.quantity(),
                filled,
                fill: fill.quantity,
            });
        }
        self.updated_at = fill.timestamp;
        self.fills.push(fill);
        Ok(())
    }

    /// Move to a terminal status.
    ///
    /// # Errors
    ///
    /// `NotTerminal` for a non-final target, `AlreadyTerminal` if the order
    /// was already finished.
    pub fn finish(
        &mut self,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<(), BrokerOrderError> {
        if !status.is_terminal() {
            return Err(BrokerOrderError::NotTerminal(status));
        }
        if self.status.is_terminal() {
            return Err(BrokerOrderError::AlreadyTerminal(self.status));
        }
        self.status = status;
        self.reason = reason;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Status report as returned to callers.
    #[must_use]
    pub fn report(&self) -> OrderStatusReport {
        OrderStatusReport::new(
            self.broker_order_id.clone(),
            self.status,
            self.order.quantity(),
            self.fills.clone(),
            self.reason.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::{CreateOrderCommand, OrderSide};
    use rust_decimal_macros::dec;

    fn shadow(quantity: Decimal) -> BrokerOrder {
        let order =
            Order::new(CreateOrderCommand::market("AAPL", OrderSide::Buy, quantity)).unwrap();
        BrokerOrder::accept(BrokerOrderId::generate(), order)
    }

    fn fill(quantity: Decimal) -> Fill {
        Fill {
            price: dec!(10),
            quantity,
            fee: dec!(1),
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn partial_fills_accumulate() {
        let mut order = shadow(dec!(100));
        order.record_fill(fill(dec!(40))).unwrap();
        order.record_fill(fill(dec!(60))).unwrap();

        assert_eq!(order.filled_quantity(), dec!(100));
        assert_eq!(order.remaining_quantity(), dec!(0));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn overfill_is_refused() {
        let mut order = shadow(dec!(100));
        order.record_fill(fill(dec!(80))).unwrap();

        let err = order.record_fill(fill(dec!(30))).unwrap_err();
        assert!(matches!(err, BrokerOrderError::Overfill { .. }));
        assert_eq!(order.filled_quantity(), dec!(80));
    }

    #[test]
    fn terminal_status_is_set_once() {
        let mut order = shadow(dec!(10));
        order.record_fill(fill(dec!(10))).unwrap();
        order.finish(OrderStatus::Executed, None).unwrap();

        assert_eq!(
            order.finish(OrderStatus::Cancelled, None),
            Err(BrokerOrderError::AlreadyTerminal(OrderStatus::Executed))
        );
        assert!(order.record_fill(fill(dec!(1))).is_err());
        assert_eq!(order.status(), OrderStatus::Executed);
    }

    #[test]
    fn finish_requires_terminal_status() {
        let mut order = shadow(dec!(10));
        assert_eq!(
            order.finish(OrderStatus::Approved, None),
            Err(BrokerOrderError::NotTerminal(OrderStatus::Approved))
        );
    }

    #[test]
    fn report_reflects_fills() {
        let mut order = shadow(dec!(10));
        order.record_fill(fill(dec!(10))).unwrap();
        order.finish(OrderStatus::Executed, None).unwrap();

        let report = order.report();
        assert_eq!(report.executed_quantity, dec!(10));
        assert_eq!(report.average_price, Some(dec!(10)));
        assert_eq!(report.total_fees, dec!(1));
    }
}
