//! Shared fixtures for the integration tests.
//!
//! `ScriptedBroker` is a venue whose every answer is decided by the test:
//! failing connects, a fixed placement error, orders that never finish,
//! partial fills, venue-side rejects, inline executions and flaky or stalled
//! status reads.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use execution_core::application::ports::{
    AccountSnapshot, BrokerError, BrokerPort, Fill, OrderResult, OrderStatusReport,
};
use execution_core::application::services::{
    CoordinatorSettings, ExecutionCoordinator, FillApplier,
};
use execution_core::application::use_cases::{
    ExecuteOrderUseCase, ExecutionOutcome, ExecutionSettings,
};
use execution_core::broker::RetryPolicy;
use execution_core::config::TopicsConfig;
use execution_core::domain::order_execution::{CreateOrderCommand, Order, OrderSide, OrderStatus};
use execution_core::domain::portfolio::Portfolio;
use execution_core::domain::shared::{BrokerOrderId, PortfolioId, Timestamp};
use execution_core::infrastructure::messaging::InMemoryMessageBus;
use execution_core::infrastructure::persistence::{
    InMemoryOrderRepository, InMemoryPortfolioRepository,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;

pub const STARTING_CASH: Decimal = dec!(100000);

#[derive(Debug, Clone)]
struct ScriptedOrder {
    quantity: Decimal,
    filled: Decimal,
    status: OrderStatus,
}

/// Venue driven entirely by the test.
pub struct ScriptedBroker {
    connected: AtomicBool,
    connect_failures: AtomicU32,
    status_failures: AtomicU32,
    place_error: Mutex<Option<BrokerError>>,
    hold_orders: AtomicBool,
    execute_inline: AtomicBool,
    partial_fill: Mutex<Option<Decimal>>,
    venue_end: Mutex<Option<(OrderStatus, String)>>,
    status_stall: Mutex<Option<Duration>>,
    fill_price: Decimal,
    fee: Decimal,
    orders: Mutex<HashMap<BrokerOrderId, ScriptedOrder>>,
    pub connect_calls: AtomicU32,
    pub place_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub cancel_calls: AtomicU32,
}

impl ScriptedBroker {
    pub fn new(fill_price: Decimal, fee: Decimal) -> Self {
        Self {
            connected: AtomicBool::new(false),
            connect_failures: AtomicU32::new(0),
            status_failures: AtomicU32::new(0),
            place_error: Mutex::new(None),
            hold_orders: AtomicBool::new(false),
            execute_inline: AtomicBool::new(false),
            partial_fill: Mutex::new(None),
            venue_end: Mutex::new(None),
            status_stall: Mutex::new(None),
            fill_price,
            fee,
            orders: Mutex::new(HashMap::new()),
            connect_calls: AtomicU32::new(0),
            place_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    /// The next `n` connects fail with `CONNECTION_FAILED`.
    pub fn fail_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` status reads fail with `CONNECTION_FAILED`.
    pub fn fail_status_reads(&self, n: u32) {
        self.status_failures.store(n, Ordering::SeqCst);
    }

    /// Every placement fails with `error`.
    pub fn always_fail_placement(&self, error: BrokerError) {
        *self.place_error.lock() = Some(error);
    }

    /// Orders stay PENDING until cancelled.
    pub fn hold_orders(&self) {
        self.hold_orders.store(true, Ordering::SeqCst);
    }

    /// Placements report EXECUTED inline.
    pub fn execute_inline(&self) {
        self.execute_inline.store(true, Ordering::SeqCst);
    }

    /// Placed orders fill `quantity` right away, then stay PENDING until
    /// cancelled.
    pub fn partially_fill(&self, quantity: Decimal) {
        *self.partial_fill.lock() = Some(quantity);
        self.hold_orders();
    }

    /// The first status read ends a pending order with `status` and `reason`.
    pub fn end_orders_with(&self, status: OrderStatus, reason: &str) {
        *self.venue_end.lock() = Some((status, reason.to_string()));
    }

    /// Every status read takes `stall` before answering.
    pub fn stall_status_reads(&self, stall: Duration) {
        *self.status_stall.lock() = Some(stall);
    }

    fn fill(&self, quantity: Decimal) -> Fill {
        Fill {
            price: self.fill_price,
            quantity,
            fee: self.fee,
            timestamp: Timestamp::now(),
        }
    }

    fn report(&self, id: &BrokerOrderId, order: &ScriptedOrder, reason: Option<String>) -> OrderStatusReport {
        let fills = if order.filled > Decimal::ZERO {
            vec![self.fill(order.filled)]
        } else {
            Vec::new()
        };
        OrderStatusReport::new(id.clone(), order.status, order.quantity, fills, reason)
    }
}

#[async_trait]
impl BrokerPort for ScriptedBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::connection_failed("scripted connect failure"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderResult, BrokerError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(BrokerError::not_connected());
        }
        if let Some(error) = self.place_error.lock().clone() {
            return Err(error);
        }

        let id = BrokerOrderId::new(format!("sb-{}", order.id()));
        let inline = self.execute_inline.load(Ordering::SeqCst);
        let status = if inline {
            OrderStatus::Executed
        } else {
            OrderStatus::Pending
        };
        let filled = if inline {
            order.quantity()
        } else {
            self.partial_fill.lock().unwrap_or(Decimal::ZERO)
        };
        self.orders.lock().insert(
            id.clone(),
            ScriptedOrder {
                quantity: order.quantity(),
                filled,
                status,
            },
        );

        Ok(OrderResult {
            broker_order_id: id,
            status,
            fills: if inline {
                vec![self.fill(order.quantity())]
            } else {
                Vec::new()
            },
            submitted_at: Timestamp::now(),
        })
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::order_not_found(broker_order_id))?;
        if order.status == OrderStatus::Executed {
            return Err(BrokerError::order_already_executed(broker_order_id));
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn get_order_status(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<OrderStatusReport, BrokerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.status_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.status_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::connection_failed("scripted status failure"));
        }
        let stall = *self.status_stall.lock();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }

        let hold = self.hold_orders.load(Ordering::SeqCst);
        let venue_end = self.venue_end.lock().clone();
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::order_not_found(broker_order_id))?;
        let mut reason = None;
        if order.status == OrderStatus::Pending {
            if let Some((status, why)) = venue_end {
                order.status = status;
                reason = Some(why);
            } else if !hold {
                order.status = OrderStatus::Executed;
                order.filled = order.quantity;
            }
        }
        let order = order.clone();
        drop(orders);
        Ok(self.report(broker_order_id, &order, reason))
    }

    async fn get_account_info(&self) -> Result<AccountSnapshot, BrokerError> {
        Ok(AccountSnapshot {
            cash: Decimal::ZERO,
            buying_power: Decimal::ZERO,
            positions: Vec::new(),
            as_of: Timestamp::now(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Everything a test needs to drive and inspect one coordinator.
pub struct Harness<B: BrokerPort + 'static> {
    pub broker: Arc<B>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub portfolios: Arc<InMemoryPortfolioRepository>,
    pub bus: Arc<InMemoryMessageBus>,
    pub fills: Arc<FillApplier>,
    pub coordinator: Arc<
        ExecutionCoordinator<B, InMemoryOrderRepository, InMemoryPortfolioRepository, InMemoryMessageBus>,
    >,
    pub outcomes: broadcast::Receiver<ExecutionOutcome>,
}

/// Timing knobs for a harness.
#[derive(Debug, Clone)]
pub struct Timing {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub order_timeout: Duration,
    pub cancel_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::immediate(3),
            poll_interval: Duration::from_millis(50),
            order_timeout: Duration::from_secs(5),
            cancel_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

pub fn harness<B: BrokerPort + 'static>(broker: Arc<B>, timing: Timing) -> Harness<B> {
    let orders = Arc::new(InMemoryOrderRepository::new());
    let portfolios = Arc::new(InMemoryPortfolioRepository::new());
    let bus = Arc::new(InMemoryMessageBus::new());
    let fills = Arc::new(FillApplier::new(Portfolio::new(
        PortfolioId::new("main"),
        STARTING_CASH,
    )));

    let executor = Arc::new(ExecuteOrderUseCase::new(
        Arc::clone(&broker),
        Arc::clone(&orders),
        Arc::clone(&portfolios),
        Arc::clone(&bus),
        Arc::clone(&fills),
        ExecutionSettings {
            retry: timing.retry.clone(),
            poll_interval: timing.poll_interval,
            order_timeout: timing.order_timeout,
            cancel_timeout: timing.cancel_timeout,
            topics: TopicsConfig::default(),
            source: "execution-core".to_string(),
        },
    ));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        executor,
        Arc::clone(&bus),
        CoordinatorSettings {
            worker_count: 4,
            queue_capacity: 32,
            shutdown_timeout: timing.shutdown_timeout,
            retry: timing.retry,
            order_approved_topic: TopicsConfig::default().order_approved,
        },
    ));
    let outcomes = coordinator.subscribe_outcomes();

    Harness {
        broker,
        orders,
        portfolios,
        bus,
        fills,
        coordinator,
        outcomes,
    }
}

impl<B: BrokerPort + 'static> Harness<B> {
    /// Wait for the next order outcome.
    pub async fn next_outcome(&mut self) -> ExecutionOutcome {
        tokio::time::timeout(Duration::from_secs(120), self.outcomes.recv())
            .await
            .expect("no outcome within two minutes")
            .expect("outcome channel closed")
    }
}

pub fn approved(cmd: CreateOrderCommand) -> Order {
    let mut order = Order::new(cmd).unwrap();
    order.approve().unwrap();
    order
}

pub fn market_buy(symbol: &str, quantity: Decimal) -> Order {
    approved(CreateOrderCommand::market(symbol, OrderSide::Buy, quantity))
}
