//! Limit-based pre-trade risk gate.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::application::ports::{RiskDecision, RiskGateError, RiskGatePort};
use crate::config::RiskConfig;
use crate::domain::order_execution::{Order, OrderSide};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::shared::Symbol;

/// Reference `RiskGatePort` built from static limits.
///
/// Checks, in order: order size, cash cover for buys (notional plus buffer),
/// and post-trade position weight for buys. Sells only face the size check.
#[derive(Debug, Clone)]
pub struct LimitsRiskGate {
    limits: RiskConfig,
    reference_prices: HashMap<Symbol, Decimal>,
    default_price: Decimal,
}

impl LimitsRiskGate {
    /// Create a gate that prices unknown symbols at `default_price`.
    #[must_use]
    pub fn new(limits: RiskConfig, default_price: Decimal) -> Self {
        Self {
            limits,
            reference_prices: HashMap::new(),
            default_price,
        }
    }

    /// Price estimates for market orders.
    #[must_use]
    pub fn with_reference_prices<I, S>(mut self, prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<Symbol>,
    {
        self.reference_prices
            .extend(prices.into_iter().map(|(s, p)| (s.into(), p)));
        self
    }

    /// Best available price estimate: the order's own price, then the
    /// portfolio mark, then the reference table.
    fn estimate_price(&self, order: &Order, portfolio: &PortfolioSnapshot) -> Decimal {
        if let Some(price) = order.reference_price() {
            return price;
        }
        let held = portfolio.quantity(order.symbol());
        if !held.is_zero() {
            return portfolio.market_value(order.symbol()) / held;
        }
        self.reference_prices
            .get(order.symbol())
            .copied()
            .unwrap_or(self.default_price)
    }

    /// Evaluate synchronously.
    #[must_use]
    pub fn check(&self, order: &Order, portfolio: &PortfolioSnapshot) -> RiskDecision {
        if order.quantity() > self.limits.max_order_quantity {
            return RiskDecision::rejected(format!(
                "order quantity {} exceeds limit {}",
                order.quantity(),
                self.limits.max_order_quantity
            ));
        }

        if order.side() == OrderSide::Sell {
            return RiskDecision::Approved;
        }

        let notional = order.quantity() * self.estimate_price(order, portfolio);
        let required = notional * (Decimal::ONE + self.limits.cash_buffer_fraction);
        if portfolio.cash < required {
            return RiskDecision::rejected(format!(
                "insufficient cash: required {}, available {}",
                required.round_dp(2),
                portfolio.cash.round_dp(2)
            ));
        }

        if portfolio.total_value <= Decimal::ZERO {
            return RiskDecision::rejected("portfolio has no value");
        }
        let weight = (portfolio.market_value(order.symbol()) + notional) / portfolio.total_value;
        if weight > self.limits.max_position_fraction {
            return RiskDecision::rejected(format!(
                "position size limit exceeded: {}% > {}%",
                (weight * Decimal::ONE_HUNDRED).round_dp(2),
                (self.limits.max_position_fraction * Decimal::ONE_HUNDRED).round_dp(2)
            ));
        }

        RiskDecision::Approved
    }
}

#[async_trait]
impl RiskGatePort for LimitsRiskGate {
    async fn evaluate(
        &self,
        order: &Order,
        portfolio: &PortfolioSnapshot,
    ) -> Result<RiskDecision, RiskGateError> {
        let decision = self.check(order, portfolio);
        debug!(order_id = %order.id(), ?decision, "Risk evaluated");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::CreateOrderCommand;
    use crate::domain::portfolio::Portfolio;
    use crate::domain::shared::PortfolioId;
    use rust_decimal_macros::dec;

    fn gate() -> LimitsRiskGate {
        LimitsRiskGate::new(RiskConfig::default(), dec!(100))
            .with_reference_prices([("AAPL", dec!(150))])
    }

    fn order(cmd: CreateOrderCommand) -> Order {
        Order::new(cmd).unwrap()
    }

    fn snapshot(cash: Decimal) -> PortfolioSnapshot {
        Portfolio::new(PortfolioId::new("p"), cash).snapshot()
    }

    #[test]
    fn small_buy_is_approved() {
        let decision = gate().check(
            &order(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(10))),
            &snapshot(dec!(100000)),
        );
        assert!(decision.is_approved());
    }

    #[test]
    fn oversized_order_is_rejected() {
        let decision = gate().check(
            &order(CreateOrderCommand::market("AAPL", OrderSide::Sell, dec!(20000))),
            &snapshot(dec!(100000)),
        );
        assert!(matches!(decision, RiskDecision::Rejected { reason } if reason.contains("exceeds limit")));
    }

    #[test]
    fn buy_needs_cash_plus_buffer() {
        // 10 * 150 = 1500 notional, 1650 with the buffer.
        let decision = gate().check(
            &order(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(10))),
            &snapshot(dec!(1600)),
        );
        assert!(matches!(decision, RiskDecision::Rejected { reason } if reason.contains("insufficient cash")));
    }

    #[test]
    fn concentrated_buy_is_rejected() {
        // 200 * 150 = 30% of 100k.
        let decision = gate().check(
            &order(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(200))),
            &snapshot(dec!(100000)),
        );
        assert!(matches!(decision, RiskDecision::Rejected { reason } if reason.contains("position size")));
    }

    #[test]
    fn limit_price_is_used_for_estimate() {
        let decision = gate().check(
            &order(CreateOrderCommand::limit("AAPL", OrderSide::Buy, dec!(200), dec!(50))),
            &snapshot(dec!(100000)),
        );
        assert!(decision.is_approved());
    }

    #[test]
    fn sells_skip_cash_checks() {
        let decision = gate().check(
            &order(CreateOrderCommand::market("AAPL", OrderSide::Sell, dec!(100))),
            &snapshot(dec!(0)),
        );
        assert!(decision.is_approved());
    }
}
