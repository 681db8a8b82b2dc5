//! Execution Coordinator Service
//!
//! Owns the worker pool that drains approved orders. One intake task reads
//! the approved-order topic, drops malformed or duplicate messages and feeds
//! a bounded queue; a fixed number of workers each run one order at a time
//! through [`ExecuteOrderUseCase`].
//!
//! Shutdown stops intake, lets queued and in-flight orders finish within the
//! grace period, then fires the interrupt so whatever is left is cancelled
//! and recorded as `interrupted`. Tasks still running a grace period after
//! the interrupt are aborted. The venue session is released last.
//!
//! Admission remembers the most recent [`DEFAULT_ID_WINDOW`] order ids; a
//! redelivery older than that is admitted again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::application::dto::decode_approved_order;
use crate::application::ports::{BrokerPort, BusMessage, MessageBusPort};
use crate::application::services::{DEFAULT_ID_WINDOW, RecentIds};
use crate::application::use_cases::{ExecuteOrderUseCase, ExecutionOutcome};
use crate::broker::{RetryPolicy, retry_with_backoff};
use crate::config::Config;
use crate::domain::order_execution::{Order, OrderRepository, OrderStatus};
use crate::domain::portfolio::PortfolioRepository;
use crate::domain::shared::OrderId;
use crate::error::ExecutionError;

/// Worker pool and intake settings.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Concurrent workers.
    pub worker_count: usize,
    /// Intake queue capacity.
    pub queue_capacity: usize,
    /// Grace period for in-flight orders at shutdown.
    pub shutdown_timeout: Duration,
    /// Backoff for the initial venue connect.
    pub retry: RetryPolicy,
    /// Topic approved orders arrive on.
    pub order_approved_topic: String,
}

impl CoordinatorSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.execution.worker_count,
            queue_capacity: config.execution.queue_capacity,
            shutdown_timeout: config.execution.shutdown_timeout(),
            retry: config.retry.policy(),
            order_approved_topic: config.topics.order_approved.clone(),
        }
    }
}

/// What happened to an order offered to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for a worker.
    Queued,
    /// Same order id already in flight or finished.
    Duplicate,
    /// Order is not APPROVED.
    NotApproved,
    /// Intake is stopped.
    Closed,
}

/// How shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every admitted order finished before the grace period ran out.
    pub drained: bool,
}

/// Worker pool driving approved orders to completion.
pub struct ExecutionCoordinator<B, O, P, M>
where
    B: BrokerPort + 'static,
    O: OrderRepository + 'static,
    P: PortfolioRepository + 'static,
    M: MessageBusPort + 'static,
{
    executor: Arc<ExecuteOrderUseCase<B, O, P, M>>,
    bus: Arc<M>,
    settings: CoordinatorSettings,
    started: AtomicBool,
    admitted: Mutex<RecentIds<OrderId>>,
    queue: Mutex<Option<mpsc::Sender<Order>>>,
    outcomes: broadcast::Sender<ExecutionOutcome>,
    intake_stop: CancellationToken,
    interrupt: CancellationToken,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
}

impl<B, O, P, M> ExecutionCoordinator<B, O, P, M>
where
    B: BrokerPort + 'static,
    O: OrderRepository + 'static,
    P: PortfolioRepository + 'static,
    M: MessageBusPort + 'static,
{
    /// Create a stopped coordinator.
    pub fn new(
        executor: Arc<ExecuteOrderUseCase<B, O, P, M>>,
        bus: Arc<M>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(settings.queue_capacity.max(16));
        Self {
            executor,
            bus,
            settings,
            started: AtomicBool::new(false),
            admitted: Mutex::new(RecentIds::new(DEFAULT_ID_WINDOW)),
            queue: Mutex::new(None),
            outcomes,
            intake_stop: CancellationToken::new(),
            interrupt: CancellationToken::new(),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    /// Receive every order outcome from now on.
    #[must_use]
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<ExecutionOutcome> {
        self.outcomes.subscribe()
    }

    /// Open the venue session, subscribe to approved orders and spawn the
    /// workers.
    ///
    /// # Errors
    ///
    /// - `Broker` if the venue cannot be reached within the retry budget
    /// - `MessageBus` if the subscription fails
    /// - `InvariantViolation` if already started
    pub async fn start(self: &Arc<Self>) -> Result<(), ExecutionError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ExecutionError::InvariantViolation(
                "coordinator already started".to_string(),
            ));
        }

        let broker = self.executor.broker();
        retry_with_backoff(&self.settings.retry, &self.intake_stop, "connect", |_| async move {
            broker.connect().await
        })
        .await
        .map_err(|e| {
            e.into_last_error()
                .map_or(ExecutionError::Interrupted, ExecutionError::from)
        })?;
        info!(broker = broker.name(), "Venue session open");

        let inbox = self
            .bus
            .subscribe(&self.settings.order_approved_topic)
            .await?;

        let (tx, rx) = mpsc::channel(self.settings.queue_capacity.max(1));
        *self.queue.lock() = Some(tx);

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut tasks = self.tasks.lock().await;
        let worker_count = self.settings.worker_count.max(1);
        for worker_id in 0..worker_count {
            tasks.spawn(worker(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&self.executor),
                self.interrupt.clone(),
                self.outcomes.clone(),
            ));
        }
        tasks.spawn(Arc::clone(self).intake(inbox));

        info!(
            workers = worker_count,
            topic = %self.settings.order_approved_topic,
            "Execution coordinator started"
        );
        Ok(())
    }

    /// Offer an approved order directly, bypassing the bus.
    pub async fn submit(&self, order: Order) -> Admission {
        if order.status() != OrderStatus::Approved {
            warn!(order_id = %order.id(), status = %order.status(), "Discarding non-approved order");
            return Admission::NotApproved;
        }

        let Some(queue) = self.queue.lock().clone() else {
            warn!(order_id = %order.id(), "Intake closed, discarding order");
            return Admission::Closed;
        };
        if !self.admitted.lock().insert(order.id().clone()) {
            warn!(order_id = %order.id(), "Duplicate order, discarding");
            return Admission::Duplicate;
        }

        let order_id = order.id().clone();
        if queue.send(order).await.is_err() {
            warn!(order_id = %order_id, "Workers gone, discarding order");
            return Admission::Closed;
        }
        debug!(order_id = %order_id, "Order queued");
        Admission::Queued
    }

    /// Stop intake, drain, interrupt at the deadline, then disconnect.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Stopping order intake");
        self.intake_stop.cancel();
        self.queue.lock().take();

        let grace = self.settings.shutdown_timeout;
        let timeout_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, join_all(&mut tasks))
            .await
            .is_ok();
        if !drained {
            warn!(timeout_ms, "Shutdown deadline reached, interrupting in-flight orders");
            self.interrupt.cancel();
            let settled = tokio::time::timeout(grace, join_all(&mut tasks)).await.is_ok();
            if !settled {
                error!(
                    timeout_ms,
                    remaining = tasks.len(),
                    "Interrupted orders did not finish, aborting their tasks"
                );
                tasks.abort_all();
                join_all(&mut tasks).await;
            }
        }

        if let Err(e) = self.executor.broker().disconnect().await {
            warn!(error = %e, "Venue disconnect failed");
        }
        info!(drained, "Execution coordinator stopped");
        ShutdownReport { drained }
    }

    async fn intake(self: Arc<Self>, mut inbox: mpsc::Receiver<BusMessage>) {
        loop {
            tokio::select! {
                () = self.intake_stop.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => self.receive(message).await,
                    None => {
                        warn!("Approved-order subscription closed");
                        break;
                    }
                },
            }
        }
        debug!("Intake stopped");
    }

    async fn receive(&self, message: BusMessage) {
        match decode_approved_order(message.payload) {
            Ok(order) => {
                self.submit(order).await;
            }
            Err(e) => warn!(topic = %message.topic, error = %e, "Discarding approved-order message"),
        }
    }
}

async fn worker<B, O, P, M>(
    worker_id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Order>>>,
    executor: Arc<ExecuteOrderUseCase<B, O, P, M>>,
    interrupt: CancellationToken,
    outcomes: broadcast::Sender<ExecutionOutcome>,
) where
    B: BrokerPort,
    O: OrderRepository,
    P: PortfolioRepository,
    M: MessageBusPort,
{
    loop {
        let next = queue.lock().await.recv().await;
        let Some(order) = next else { break };

        let span = info_span!("order", order_id = %order.id(), worker_id);
        let outcome = executor.execute(order, &interrupt).instrument(span).await;
        // Nobody listening is fine.
        let _ = outcomes.send(outcome);
    }
    debug!(worker_id, "Worker stopped");
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        match result {
            Err(e) if e.is_cancelled() => debug!("Coordinator task aborted"),
            Err(e) => error!(error = %e, "Coordinator task failed"),
            Ok(()) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::FillApplier;
    use crate::application::use_cases::ExecutionSettings;
    use crate::config::{BrokerConfig, TopicsConfig};
    use crate::domain::order_execution::{CreateOrderCommand, OrderSide};
    use crate::domain::portfolio::Portfolio;
    use crate::domain::shared::PortfolioId;
    use crate::infrastructure::broker::SimulatedBroker;
    use crate::infrastructure::messaging::InMemoryMessageBus;
    use crate::infrastructure::persistence::{InMemoryOrderRepository, InMemoryPortfolioRepository};
    use rust_decimal_macros::dec;

    type Coordinator = ExecutionCoordinator<
        SimulatedBroker,
        InMemoryOrderRepository,
        InMemoryPortfolioRepository,
        InMemoryMessageBus,
    >;

    fn coordinator() -> (Arc<Coordinator>, Arc<SimulatedBroker>) {
        let broker = Arc::new(SimulatedBroker::new(BrokerConfig {
            latency_ms: 0,
            error_rate: 0.0,
            price_variation: dec!(0),
            ..BrokerConfig::default()
        }));
        let bus = Arc::new(InMemoryMessageBus::new());
        let executor = Arc::new(ExecuteOrderUseCase::new(
            Arc::clone(&broker),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryPortfolioRepository::new()),
            Arc::clone(&bus),
            Arc::new(FillApplier::new(Portfolio::new(
                PortfolioId::new("main"),
                dec!(100000),
            ))),
            ExecutionSettings {
                retry: RetryPolicy::immediate(3),
                poll_interval: Duration::from_millis(50),
                order_timeout: Duration::from_secs(5),
                cancel_timeout: Duration::from_secs(2),
                topics: TopicsConfig::default(),
                source: "execution-core".to_string(),
            },
        ));
        let settings = CoordinatorSettings {
            worker_count: 2,
            queue_capacity: 8,
            shutdown_timeout: Duration::from_secs(10),
            retry: RetryPolicy::immediate(3),
            order_approved_topic: "order.approved".to_string(),
        };
        (
            Arc::new(ExecutionCoordinator::new(executor, bus, settings)),
            broker,
        )
    }

    fn approved() -> Order {
        let mut order =
            Order::new(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(1))).unwrap();
        order.approve().unwrap();
        order
    }

    #[tokio::test(start_paused = true)]
    async fn submit_before_start_is_closed() {
        let (coordinator, _) = coordinator();
        assert_eq!(coordinator.submit(approved()).await, Admission::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();

        let err = coordinator.start().await.unwrap_err();
        assert!(err.is_invariant_violation());
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_and_pending_orders_are_not_queued() {
        let (coordinator, _) = coordinator();
        coordinator.start().await.unwrap();
        let order = approved();

        assert_eq!(coordinator.submit(order.clone()).await, Admission::Queued);
        assert_eq!(coordinator.submit(order).await, Admission::Duplicate);
        let pending =
            Order::new(CreateOrderCommand::market("AAPL", OrderSide::Buy, dec!(1))).unwrap();
        assert_eq!(coordinator.submit(pending).await, Admission::NotApproved);

        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_and_disconnects() {
        let (coordinator, broker) = coordinator();
        let mut outcomes = coordinator.subscribe_outcomes();
        coordinator.start().await.unwrap();
        assert!(broker.is_connected());

        coordinator.submit(approved()).await;
        let report = coordinator.shutdown().await;

        assert!(report.drained);
        assert!(outcomes.recv().await.unwrap().is_executed());
        assert!(!broker.is_connected());
        assert_eq!(coordinator.submit(approved()).await, Admission::Closed);
    }
}
