//! Execute Order Use Case
//!
//! Drives one approved order end to end:
//!
//! 1. place it at the venue, retrying transient failures with backoff;
//! 2. poll its status until terminal or until the order deadline;
//! 3. book the fills into the portfolio exactly once;
//! 4. persist, then publish the outcome.
//!
//! Steps for one order are strictly sequential. Different orders run through
//! separate calls concurrently and share only the [`FillApplier`].
//!
//! Every venue call made while monitoring races the order deadline and the
//! interrupt. Calls made while abandoning an order are bounded by
//! [`ExecutionSettings::cancel_timeout`]. Fills the venue made before an order
//! ended without executing are still booked.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::dto::{
    ExecutedOrderMessage, MessageEnvelope, OrderFailedMessage, PortfolioUpdateMessage,
};
use crate::application::ports::{
    BrokerError, BrokerPort, MessageBusPort, OrderResult, OrderStatusReport,
};
use crate::application::services::{FillApplier, FillOutcome};
use crate::broker::{RetryError, RetryPolicy, Retryable, retry_with_backoff};
use crate::config::{Config, TopicsConfig};
use crate::domain::order_execution::{Order, OrderRepository, OrderStatus};
use crate::domain::portfolio::PortfolioRepository;
use crate::domain::shared::{BrokerOrderId, OrderId, RepositoryError, Timestamp};
use crate::error::ExecutionError;

/// Reason recorded on orders abandoned at the shutdown deadline.
pub const INTERRUPTED_REASON: &str = "interrupted";

/// Reason recorded on orders that missed the monitoring deadline.
pub const TIMED_OUT_REASON: &str = "timed out";

/// Log code attached to writes that exhausted their retries.
const PERSISTENCE_UNAVAILABLE: &str = "PERSISTENCE_UNAVAILABLE";

/// Knobs for one order's execution.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Backoff for venue, persistence and bus calls.
    pub retry: RetryPolicy,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Deadline for the venue to report a terminal status.
    pub order_timeout: Duration,
    /// Bound on the cancel and on the final status read of an abandoned order.
    pub cancel_timeout: Duration,
    /// Topics outcomes are published to.
    pub topics: TopicsConfig,
    /// `source` on published envelopes.
    pub source: String,
}

impl ExecutionSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry.policy(),
            poll_interval: config.execution.poll_interval(),
            order_timeout: config.execution.order_timeout(),
            cancel_timeout: config.execution.cancel_timeout(),
            topics: config.topics.clone(),
            source: config.execution.source.clone(),
        }
    }
}

/// Final result of processing one order.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The order executed and its fills were booked.
    Executed {
        /// The order, in `EXECUTED` state.
        order: Order,
        /// Venue identifier.
        broker_order_id: BrokerOrderId,
        /// False if the order or portfolio write exhausted its retries.
        persisted: bool,
    },
    /// The order ended `REJECTED` or `CANCELLED`.
    Failed {
        /// The order, in its terminal state.
        order: Order,
        /// Code of the error that caused the give-up.
        error_code: &'static str,
        /// Reason recorded on the order.
        reason: String,
        /// Placement attempts consumed.
        retry_count: u32,
        /// Quantity the venue filled before the order ended, already booked.
        filled_quantity: Decimal,
        /// False if the order or portfolio write exhausted its retries.
        persisted: bool,
    },
    /// Processing hit an illegal transition and stopped without touching
    /// the order further.
    Aborted {
        /// Order identifier.
        order_id: OrderId,
        /// The violation.
        error: ExecutionError,
    },
}

impl ExecutionOutcome {
    /// The order in its final state, unless processing aborted.
    #[must_use]
    pub const fn order(&self) -> Option<&Order> {
        match self {
            Self::Executed { order, .. } | Self::Failed { order, .. } => Some(order),
            Self::Aborted { .. } => None,
        }
    }

    /// Returns true if the order executed.
    #[must_use]
    pub const fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }

    /// Returns false if a write for this order exhausted its retries.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        match self {
            Self::Executed { persisted, .. } | Self::Failed { persisted, .. } => *persisted,
            Self::Aborted { .. } => true,
        }
    }
}

struct Failure {
    error: ExecutionError,
    retry_count: u32,
    broker_order_id: Option<BrokerOrderId>,
    filled_quantity: Decimal,
    persisted: bool,
}

impl Failure {
    const fn new(error: ExecutionError, retry_count: u32) -> Self {
        Self {
            error,
            retry_count,
            broker_order_id: None,
            filled_quantity: Decimal::ZERO,
            persisted: true,
        }
    }

    fn at_venue(error: ExecutionError, retry_count: u32, broker_order_id: &BrokerOrderId) -> Self {
        Self {
            broker_order_id: Some(broker_order_id.clone()),
            ..Self::new(error, retry_count)
        }
    }

    fn with_partial(mut self, filled_quantity: Decimal, persisted: bool) -> Self {
        self.filled_quantity = filled_quantity;
        self.persisted = persisted;
        self
    }
}

// Monitoring gave up; `report` is the venue's latest word on the order.
struct Abandoned {
    error: ExecutionError,
    report: Option<OrderStatusReport>,
}

/// Use case driving approved orders through the venue.
pub struct ExecuteOrderUseCase<B, O, P, M>
where
    B: BrokerPort,
    O: OrderRepository,
    P: PortfolioRepository,
    M: MessageBusPort,
{
    broker: Arc<B>,
    orders: Arc<O>,
    portfolios: Arc<P>,
    bus: Arc<M>,
    fills: Arc<FillApplier>,
    settings: ExecutionSettings,
    // Serializes portfolio writes so the last write always carries the
    // latest booked state.
    portfolio_writes: tokio::sync::Mutex<()>,
    // Persistence and publication run to completion even after the
    // interrupt fires.
    detached: CancellationToken,
}

impl<B, O, P, M> ExecuteOrderUseCase<B, O, P, M>
where
    B: BrokerPort,
    O: OrderRepository,
    P: PortfolioRepository,
    M: MessageBusPort,
{
    /// Create a new `ExecuteOrderUseCase`.
    pub fn new(
        broker: Arc<B>,
        orders: Arc<O>,
        portfolios: Arc<P>,
        bus: Arc<M>,
        fills: Arc<FillApplier>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            broker,
            orders,
            portfolios,
            bus,
            fills,
            settings,
            portfolio_writes: tokio::sync::Mutex::new(()),
            detached: CancellationToken::new(),
        }
    }

    /// The venue this use case places orders with.
    pub const fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Execution settings in effect.
    pub const fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Process one approved order to a final outcome.
    ///
    /// `interrupt` fires at the shutdown deadline: a pending backoff, venue
    /// call or poll wait ends, the venue order is cancelled best-effort and
    /// the order is recorded as `CANCELLED` with reason `interrupted`.
    pub async fn execute(&self, mut order: Order, interrupt: &CancellationToken) -> ExecutionOutcome {
        let order_id = order.id().clone();

        match self.drive(&mut order, interrupt).await {
            Ok((broker_order_id, persisted)) => ExecutionOutcome::Executed {
                order,
                broker_order_id,
                persisted,
            },
            Err(failure) if failure.error.is_invariant_violation() => {
                error!(
                    order_id = %order_id,
                    error = %failure.error,
                    "Invariant violation, abandoning order"
                );
                ExecutionOutcome::Aborted {
                    order_id,
                    error: failure.error,
                }
            }
            Err(failure) => self.fail(order, failure).await,
        }
    }

    async fn drive(
        &self,
        order: &mut Order,
        interrupt: &CancellationToken,
    ) -> Result<(BrokerOrderId, bool), Failure> {
        if order.status() != OrderStatus::Approved {
            return Err(Failure::new(
                ExecutionError::InvariantViolation(format!(
                    "order {} is {}, expected APPROVED",
                    order.id(),
                    order.status()
                )),
                0,
            ));
        }

        let (placed, attempts) = self.place(order, interrupt).await?;
        let broker_order_id = placed.broker_order_id.clone();
        info!(
            order_id = %order.id(),
            broker_order_id = %broker_order_id,
            attempts,
            status = %placed.status,
            "Order placed"
        );

        let report = if placed.is_terminal() {
            placed.into_report(order.quantity())
        } else {
            match self.monitor(&broker_order_id, order.quantity(), interrupt).await {
                Ok(report) => report,
                Err(Abandoned { error, report }) => {
                    let failure = Failure::at_venue(error, attempts, &broker_order_id);
                    return Err(match report {
                        Some(report) => self.book_partial(order, &report, failure).await,
                        None => failure,
                    });
                }
            }
        };

        match report.status {
            OrderStatus::Executed => {
                let persisted = self
                    .settle(order, &report)
                    .await
                    .map_err(|e| Failure::at_venue(e, attempts, &broker_order_id))?;
                Ok((broker_order_id, persisted))
            }
            OrderStatus::Rejected | OrderStatus::Cancelled => {
                let reason = report
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("venue reported {}", report.status));
                let failure = Failure::at_venue(
                    BrokerError::order_rejected(reason, false).into(),
                    attempts,
                    &broker_order_id,
                );
                Err(self.book_partial(order, &report, failure).await)
            }
            other => Err(Failure::at_venue(
                ExecutionError::InvariantViolation(format!(
                    "monitoring ended on non-terminal status {other}"
                )),
                attempts,
                &broker_order_id,
            )),
        }
    }

    async fn place(
        &self,
        order: &Order,
        interrupt: &CancellationToken,
    ) -> Result<(OrderResult, u32), Failure> {
        let broker = &self.broker;

        let placed = retry_with_backoff(&self.settings.retry, interrupt, "place_order", |attempt| async move {
            if !broker.is_connected() {
                debug!(attempt, "Venue session down, reconnecting");
                broker.connect().await?;
            }
            broker.place_order(order).await.map(|result| (result, attempt))
        })
        .await;

        match placed {
            Ok(placed) => Ok(placed),
            Err(RetryError::Interrupted { attempts, .. }) => {
                Err(Failure::new(ExecutionError::Interrupted, attempts))
            }
            Err(e) => {
                let attempts = e.attempts();
                let error = e
                    .into_last_error()
                    .map_or(ExecutionError::Interrupted, ExecutionError::from);
                Err(Failure::new(error, attempts))
            }
        }
    }

    async fn monitor(
        &self,
        broker_order_id: &BrokerOrderId,
        quantity: Decimal,
        interrupt: &CancellationToken,
    ) -> Result<OrderStatusReport, Abandoned> {
        let deadline = Instant::now() + self.settings.order_timeout;
        let mut last = None;

        loop {
            let polled = tokio::select! {
                biased;
                () = interrupt.cancelled() => Err(ExecutionError::Interrupted),
                () = sleep_until(deadline) => Err(self.timed_out()),
                polled = self.poll(broker_order_id) => Ok(polled),
            };

            match polled {
                Err(reason) => return self.abandon(broker_order_id, reason, last).await,
                Ok(Ok(Some(report))) if report.is_terminal() => return Ok(report),
                Ok(Ok(Some(report))) => {
                    debug!(
                        broker_order_id = %broker_order_id,
                        executed = %report.executed_quantity,
                        requested = %quantity,
                        "Order still working"
                    );
                    last = Some(report);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => return self.abandon(broker_order_id, e.into(), last).await,
            }
        }
    }

    // One poll step. `None` means the read failed in a way the next poll may
    // recover from.
    async fn poll(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Option<OrderStatusReport>, BrokerError> {
        sleep(self.settings.poll_interval).await;

        match self.broker.get_order_status(broker_order_id).await {
            Ok(report) => Ok(Some(report)),
            Err(BrokerError::NotConnected { .. }) => {
                warn!(broker_order_id = %broker_order_id, "Venue session lost while polling");
                if let Err(e) = self.broker.connect().await {
                    warn!(error = %e, "Reconnect failed, will retry on next poll");
                }
                Ok(None)
            }
            Err(e) if e.is_retryable() => {
                warn!(broker_order_id = %broker_order_id, error = %e, "Status poll failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // Best-effort cancel, then one last status read. An execution that raced
    // the cancel is returned so it still gets booked.
    async fn abandon(
        &self,
        broker_order_id: &BrokerOrderId,
        reason: ExecutionError,
        last: Option<OrderStatusReport>,
    ) -> Result<OrderStatusReport, Abandoned> {
        let bound = self.settings.cancel_timeout;
        let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);

        match timeout(bound, self.broker.cancel_order(broker_order_id)).await {
            Ok(Ok(())) => info!(broker_order_id = %broker_order_id, reason = %reason, "Cancelled at venue"),
            Ok(Err(BrokerError::OrderAlreadyExecuted { .. })) => {
                info!(broker_order_id = %broker_order_id, "Venue refused cancel, order already executed");
            }
            Ok(Err(e)) => warn!(broker_order_id = %broker_order_id, error = %e, "Best-effort cancel failed"),
            Err(_) => warn!(broker_order_id = %broker_order_id, timeout_ms = bound_ms, "Cancel did not complete in time"),
        }

        match timeout(bound, self.broker.get_order_status(broker_order_id)).await {
            Ok(Ok(report)) if report.status == OrderStatus::Executed => {
                info!(broker_order_id = %broker_order_id, "Filled before cancel reached the venue");
                Ok(report)
            }
            Ok(Ok(report)) => Err(Abandoned {
                error: reason,
                report: Some(report),
            }),
            Ok(Err(e)) => {
                warn!(broker_order_id = %broker_order_id, error = %e, "Final status read failed");
                Err(Abandoned { error: reason, report: last })
            }
            Err(_) => {
                warn!(broker_order_id = %broker_order_id, timeout_ms = bound_ms, "Final status read did not complete in time");
                Err(Abandoned { error: reason, report: last })
            }
        }
    }

    // Fills on an order that ended without executing are still real money.
    async fn book_partial(&self, order: &Order, report: &OrderStatusReport, failure: Failure) -> Failure {
        let filled = report.executed_quantity;
        if filled <= Decimal::ZERO {
            return failure;
        }

        match self.fills.apply(order, report) {
            Ok(FillOutcome::Applied {
                realized_pnl,
                snapshot,
            }) => {
                info!(
                    order_id = %order.id(),
                    broker_order_id = %report.broker_order_id,
                    symbol = %order.symbol(),
                    filled = %filled,
                    requested = %report.requested_quantity,
                    fees = %report.total_fees,
                    realized_pnl = %realized_pnl,
                    cash = %snapshot.cash,
                    "Partial fills booked"
                );
                let persisted = self.persist_portfolio().await;
                self.publish(
                    &self.settings.topics.portfolio_update,
                    PortfolioUpdateMessage::from(snapshot),
                )
                .await;
                failure.with_partial(filled, persisted)
            }
            Ok(FillOutcome::AlreadyApplied) => {
                debug!(broker_order_id = %report.broker_order_id, "Partial fills already booked");
                failure.with_partial(filled, true)
            }
            Err(e) => {
                error!(
                    order_id = %order.id(),
                    broker_order_id = %report.broker_order_id,
                    filled = %filled,
                    error = %e,
                    "Partial fills could not be booked"
                );
                failure
            }
        }
    }

    async fn settle(&self, order: &mut Order, report: &OrderStatusReport) -> Result<bool, ExecutionError> {
        let price = report.average_price.ok_or_else(|| {
            ExecutionError::from(BrokerError::order_rejected(
                "venue reported execution without fills",
                false,
            ))
        })?;
        let executed_at = report.fills.last().map_or_else(Timestamp::now, |f| f.timestamp);

        // Validate the transition before any money moves.
        let mut executed = order.clone();
        executed.execute(price, report.executed_quantity, executed_at)?;

        let snapshot = match self.fills.apply(order, report)? {
            FillOutcome::Applied {
                realized_pnl,
                snapshot,
            } => {
                info!(
                    order_id = %order.id(),
                    symbol = %order.symbol(),
                    quantity = %report.executed_quantity,
                    price = %price,
                    fees = %report.total_fees,
                    realized_pnl = %realized_pnl,
                    cash = %snapshot.cash,
                    "Fills booked"
                );
                Some(snapshot)
            }
            FillOutcome::AlreadyApplied => {
                warn!(broker_order_id = %report.broker_order_id, "Fills already booked, skipping");
                None
            }
        };
        *order = executed;

        let mut persisted = self.persist_order(order).await;
        if snapshot.is_some() {
            persisted &= self.persist_portfolio().await;
        }

        let executed_message = ExecutedOrderMessage {
            order: order.clone(),
            broker_order_id: report.broker_order_id.clone(),
            fills: report.fills.clone(),
            fees: report.total_fees,
            broker: self.broker.name().to_string(),
        };
        self.publish(&self.settings.topics.order_executed, executed_message)
            .await;
        if let Some(snapshot) = snapshot {
            self.publish(
                &self.settings.topics.portfolio_update,
                PortfolioUpdateMessage::from(snapshot),
            )
            .await;
        }
        Ok(persisted)
    }

    async fn fail(&self, mut order: Order, failure: Failure) -> ExecutionOutcome {
        let Failure {
            error,
            retry_count,
            broker_order_id,
            filled_quantity,
            persisted,
        } = failure;

        let reason = match &error {
            ExecutionError::Interrupted => INTERRUPTED_REASON.to_string(),
            ExecutionError::Timeout { .. } => TIMED_OUT_REASON.to_string(),
            other => other.to_string(),
        };
        let transition = match error {
            ExecutionError::Interrupted => order.cancel(&reason),
            _ => order.reject(&reason),
        };
        if let Err(e) = transition {
            let violation = ExecutionError::from(e);
            error!(order_id = %order.id(), error = %violation, "Cannot record failure");
            return ExecutionOutcome::Aborted {
                order_id: order.id().clone(),
                error: violation,
            };
        }

        warn!(
            order_id = %order.id(),
            code = error.code(),
            retry_count,
            filled = %filled_quantity,
            reason = %reason,
            status = %order.status(),
            "Order failed"
        );
        let persisted = self.persist_order(&order).await && persisted;

        let message = OrderFailedMessage {
            order: order.clone(),
            reason: reason.clone(),
            error_code: error.code().to_string(),
            retry_count,
            broker_order_id,
            filled_quantity,
        };
        self.publish(&self.settings.topics.order_failed, message).await;

        ExecutionOutcome::Failed {
            order,
            error_code: error.code(),
            reason,
            retry_count,
            filled_quantity,
            persisted,
        }
    }

    fn timed_out(&self) -> ExecutionError {
        ExecutionError::Timeout {
            after_ms: u64::try_from(self.settings.order_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn persist_order(&self, order: &Order) -> bool {
        let orders = &self.orders;
        let result = retry_with_backoff(&self.settings.retry, &self.detached, "persist_order", |_| async move {
            match orders.update(order).await {
                Err(RepositoryError::NotFound { .. }) => orders.create(order).await,
                other => other,
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    code = PERSISTENCE_UNAVAILABLE,
                    order_id = %order.id(),
                    status = %order.status(),
                    error = %e,
                    "Order state not persisted"
                );
                false
            }
        }
    }

    async fn persist_portfolio(&self) -> bool {
        let _writing = self.portfolio_writes.lock().await;
        let portfolio = self.fills.portfolio();
        let portfolios = &self.portfolios;
        let portfolio = &portfolio;

        let result = retry_with_backoff(&self.settings.retry, &self.detached, "persist_portfolio", |_| async move {
            match portfolios.update_positions(portfolio).await {
                Err(RepositoryError::NotFound { .. }) => portfolios.save(portfolio).await,
                other => other,
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    code = PERSISTENCE_UNAVAILABLE,
                    portfolio_id = %portfolio.id(),
                    error = %e,
                    "Portfolio not persisted"
                );
                false
            }
        }
    }

    async fn publish<T: Serialize>(&self, topic: &str, data: T) {
        let payload = match MessageEnvelope::new(topic, &self.settings.source, data).to_value() {
            Ok(payload) => payload,
            Err(e) => {
                error!(topic, error = %e, "Cannot serialize outgoing message");
                return;
            }
        };
        let bus = &self.bus;
        let payload = &payload;

        let result = retry_with_backoff(&self.settings.retry, &self.detached, "publish", |_| async move {
            bus.publish(topic, payload.clone()).await
        })
        .await;

        if let Err(e) = result {
            error!(topic, error = %e, "Publish failed");
        }
    }
}
