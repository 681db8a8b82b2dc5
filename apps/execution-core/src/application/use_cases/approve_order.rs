//! Approve Order Use Case
//!
//! Runs a PENDING order past the risk gate. Approved orders are stored and
//! published for execution; refused ones are cancelled with the gate's reason.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::application::dto::{MessageEnvelope, OrderFailedMessage};
use crate::application::ports::{MessageBusError, MessageBusPort, RiskDecision, RiskGatePort};
use crate::application::services::FillApplier;
use crate::config::TopicsConfig;
use crate::domain::order_execution::{Order, OrderRepository};
use crate::error::ExecutionError;

/// Error code on orders refused by the risk gate.
pub const RISK_REJECTED: &str = "RISK_REJECTED";

/// Result of an approval request.
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// Order is now APPROVED and queued for execution.
    Approved(Order),
    /// Order was refused and is now CANCELLED.
    Rejected {
        /// The order, in `CANCELLED` state.
        order: Order,
        /// Reason given by the gate.
        reason: String,
    },
}

/// Use case gating orders on risk limits.
pub struct ApproveOrderUseCase<R, O, M>
where
    R: RiskGatePort,
    O: OrderRepository,
    M: MessageBusPort,
{
    risk_gate: Arc<R>,
    orders: Arc<O>,
    bus: Arc<M>,
    portfolio: Arc<FillApplier>,
    topics: TopicsConfig,
    source: String,
}

impl<R, O, M> ApproveOrderUseCase<R, O, M>
where
    R: RiskGatePort,
    O: OrderRepository,
    M: MessageBusPort,
{
    /// Create a new `ApproveOrderUseCase`.
    pub fn new(
        risk_gate: Arc<R>,
        orders: Arc<O>,
        bus: Arc<M>,
        portfolio: Arc<FillApplier>,
        topics: TopicsConfig,
        source: impl Into<String>,
    ) -> Self {
        Self {
            risk_gate,
            orders,
            bus,
            portfolio,
            topics,
            source: source.into(),
        }
    }

    /// Evaluate `order` against the current portfolio.
    ///
    /// # Errors
    ///
    /// - `InvalidOrder` if the order terms are invalid
    /// - `InvariantViolation` if the order is not PENDING
    /// - `RiskGate` if the gate cannot be reached
    /// - `Repository` / `MessageBus` if storing or publishing fails
    pub async fn execute(&self, mut order: Order) -> Result<ApprovalOutcome, ExecutionError> {
        order.validate()?;

        let snapshot = self.portfolio.snapshot();
        let decision = self.risk_gate.evaluate(&order, &snapshot).await?;

        match decision {
            RiskDecision::Approved => {
                order.approve()?;
                self.orders.create(&order).await?;
                let payload =
                    MessageEnvelope::new(&self.topics.order_approved, &self.source, &order)
                        .to_value()
                        .map_err(MessageBusError::from)?;
                self.bus
                    .publish(&self.topics.order_approved, payload)
                    .await?;

                info!(order_id = %order.id(), symbol = %order.symbol(), "Order approved");
                Ok(ApprovalOutcome::Approved(order))
            }
            RiskDecision::Rejected { reason } => {
                order.cancel(&reason)?;
                self.orders.create(&order).await?;
                let message = OrderFailedMessage {
                    order: order.clone(),
                    reason: reason.clone(),
                    error_code: RISK_REJECTED.to_string(),
                    retry_count: 0,
                    broker_order_id: None,
                    filled_quantity: Decimal::ZERO,
                };
                let payload =
                    MessageEnvelope::new(&self.topics.order_rejected, &self.source, message)
                        .to_value()
                        .map_err(MessageBusError::from)?;
                self.bus
                    .publish(&self.topics.order_rejected, payload)
                    .await?;

                warn!(order_id = %order.id(), reason = %reason, "Order refused by risk gate");
                Ok(ApprovalOutcome::Rejected { order, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::decode_approved_order;
    use crate::application::ports::{MockRiskGatePort, RiskGateError};
    use crate::domain::order_execution::{CreateOrderCommand, OrderSide, OrderStatus};
    use crate::domain::portfolio::Portfolio;
    use crate::domain::shared::PortfolioId;
    use crate::infrastructure::messaging::InMemoryMessageBus;
    use crate::infrastructure::persistence::InMemoryOrderRepository;
    use rust_decimal_macros::dec;

    fn use_case(
        gate: MockRiskGatePort,
    ) -> (
        ApproveOrderUseCase<MockRiskGatePort, InMemoryOrderRepository, InMemoryMessageBus>,
        Arc<InMemoryOrderRepository>,
        Arc<InMemoryMessageBus>,
    ) {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let bus = Arc::new(InMemoryMessageBus::new());
        let portfolio = Arc::new(FillApplier::new(Portfolio::new(
            PortfolioId::new("main"),
            dec!(10000),
        )));
        let use_case = ApproveOrderUseCase::new(
            Arc::new(gate),
            Arc::clone(&orders),
            Arc::clone(&bus),
            portfolio,
            TopicsConfig::default(),
            "risk-gate",
        );
        (use_case, orders, bus)
    }

    fn pending() -> Order {
        Order::new(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(10))).unwrap()
    }

    #[tokio::test]
    async fn approved_order_is_stored_and_published() {
        let mut gate = MockRiskGatePort::new();
        gate.expect_evaluate()
            .withf(|_, snapshot| snapshot.cash == dec!(10000))
            .times(1)
            .returning(|_, _| Ok(RiskDecision::Approved));
        let (use_case, orders, bus) = use_case(gate);
        let order = pending();

        let outcome = use_case.execute(order.clone()).await.unwrap();

        let ApprovalOutcome::Approved(approved) = outcome else {
            panic!("expected approval");
        };
        assert_eq!(approved.status(), OrderStatus::Approved);
        let stored = orders.get(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Approved);

        let published = bus.published_on("order.approved");
        assert_eq!(published.len(), 1);
        // The executor's intake accepts what the approver publishes.
        let decoded = decode_approved_order(published[0].clone()).unwrap();
        assert_eq!(decoded.id(), order.id());
    }

    #[tokio::test]
    async fn refused_order_is_cancelled_with_reason() {
        let mut gate = MockRiskGatePort::new();
        gate.expect_evaluate()
            .returning(|_, _| Ok(RiskDecision::rejected("insufficient cash")));
        let (use_case, orders, bus) = use_case(gate);
        let order = pending();

        let outcome = use_case.execute(order.clone()).await.unwrap();

        let ApprovalOutcome::Rejected { order: refused, reason } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(refused.status(), OrderStatus::Cancelled);
        assert_eq!(reason, "insufficient cash");
        assert_eq!(
            orders.get(order.id()).await.unwrap().unwrap().status(),
            OrderStatus::Cancelled
        );

        let published = bus.published_on("order.rejected");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0]["data"]["error_code"], RISK_REJECTED);
        assert!(bus.published_on("order.approved").is_empty());
    }

    #[tokio::test]
    async fn gate_outage_leaves_order_untouched() {
        let mut gate = MockRiskGatePort::new();
        gate.expect_evaluate()
            .returning(|_, _| Err(RiskGateError::Unavailable("down".to_string())));
        let (use_case, orders, bus) = use_case(gate);

        let err = use_case.execute(pending()).await.unwrap_err();

        assert_eq!(err.code(), "RISK_GATE_UNAVAILABLE");
        assert!(orders.is_empty());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn already_approved_order_is_an_invariant_violation() {
        let mut gate = MockRiskGatePort::new();
        gate.expect_evaluate()
            .returning(|_, _| Ok(RiskDecision::Approved));
        let (use_case, _, _) = use_case(gate);
        let mut order = pending();
        order.approve().unwrap();

        let err = use_case.execute(order).await.unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[tokio::test]
    async fn invalid_order_never_reaches_the_gate() {
        let mut gate = MockRiskGatePort::new();
        gate.expect_evaluate().never();
        let (use_case, _, _) = use_case(gate);
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "o-1",
            "symbol": "AAPL",
            "side": "BUY",
            "order_type": "MARKET",
            "quantity": "0",
            "status": "PENDING",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let err = use_case.execute(order).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ORDER");
    }
}
