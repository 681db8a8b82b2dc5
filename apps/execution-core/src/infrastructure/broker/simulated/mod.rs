//! Simulated execution venue.
//!
//! Models the behaviour of a real venue closely enough to exercise the
//! coordinator: every call waits a configurable latency and may fail
//! transiently; market orders fill asynchronously after a random delay at a
//! perturbed reference price; limit orders fill once the perturbed price
//! crosses the limit; stop orders rest until cancelled.
//!
//! The venue keeps its own account ledger so `get_account_info` is
//! self-consistent. That ledger is unrelated to the coordinator's portfolio.

mod broker_order;
mod ledger;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

pub use broker_order::{BrokerOrder, BrokerOrderError};
pub use ledger::VenueLedger;

use crate::application::ports::{
    AccountSnapshot, BrokerError, BrokerPort, Fill, OrderResult, OrderStatusReport,
};
use crate::config::BrokerConfig;
use crate::domain::order_execution::{Order, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{BrokerOrderId, Symbol, Timestamp};

/// Price floor for perturbed quotes.
const MIN_TICK: Decimal = dec!(0.01);

#[derive(Debug)]
struct VenueState {
    orders: HashMap<BrokerOrderId, BrokerOrder>,
    ledger: VenueLedger,
}

enum FillAttempt {
    Filled,
    Waiting,
    Gone,
}

#[derive(Debug)]
struct Inner {
    config: BrokerConfig,
    connected: AtomicBool,
    error_rate: Mutex<f64>,
    reference_prices: Mutex<HashMap<Symbol, Decimal>>,
    state: Mutex<VenueState>,
}

/// Simulated implementation of `BrokerPort`.
#[derive(Debug, Clone)]
pub struct SimulatedBroker {
    inner: Arc<Inner>,
}

impl SimulatedBroker {
    /// Create a disconnected venue.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let reference_prices = config
            .reference_prices
            .iter()
            .map(|(symbol, price)| (Symbol::new(symbol.as_str()), *price))
            .collect();

        Self {
            inner: Arc::new(Inner {
                connected: AtomicBool::new(false),
                error_rate: Mutex::new(config.error_rate.clamp(0.0, 1.0)),
                reference_prices: Mutex::new(reference_prices),
                state: Mutex::new(VenueState {
                    orders: HashMap::new(),
                    ledger: VenueLedger::new(config.initial_cash),
                }),
                config,
            }),
        }
    }

    /// Change the probability of transient failures. Clamped to `[0, 1]`.
    pub fn set_error_rate(&self, rate: f64) {
        *self.inner.error_rate.lock() = rate.clamp(0.0, 1.0);
    }

    /// Set the reference price of a symbol.
    pub fn set_reference_price(&self, symbol: impl Into<Symbol>, price: Decimal) {
        self.inner
            .reference_prices
            .lock()
            .insert(symbol.into(), price);
    }

    /// Venue-side copy of an order.
    #[must_use]
    pub fn order(&self, broker_order_id: &BrokerOrderId) -> Option<BrokerOrder> {
        self.inner.state.lock().orders.get(broker_order_id).cloned()
    }

    /// Number of orders accepted so far.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.inner.state.lock().orders.len()
    }

    fn schedule_fills(&self, broker_order_id: BrokerOrderId) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.fill_delay()).await;
                match inner.try_fill(&broker_order_id) {
                    FillAttempt::Waiting => {}
                    FillAttempt::Filled | FillAttempt::Gone => break,
                }
            }
        });
    }
}

impl Inner {
    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn roll_failure(&self) -> bool {
        let rate = *self.error_rate.lock();
        rate > 0.0 && rand::rng().random::<f64>() < rate
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::not_connected())
        }
    }

    fn fill_delay(&self) -> Duration {
        let min = self.config.fill_delay_min_ms;
        let max = self.config.fill_delay_max_ms.max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn quote(&self, symbol: &Symbol) -> Decimal {
        let reference = self
            .reference_prices
            .lock()
            .get(symbol)
            .copied()
            .unwrap_or(self.config.default_price);

        let variation = self.config.price_variation;
        if variation.is_zero() {
            return reference;
        }
        let unit = Decimal::new(rand::rng().random_range(-10_000_i64..=10_000), 4);
        (reference + unit * variation).round_dp(2).max(MIN_TICK)
    }

    fn fee(&self, quantity: Decimal) -> Decimal {
        (quantity * self.config.fee_per_share).max(self.config.min_fee)
    }

    fn try_fill(&self, broker_order_id: &BrokerOrderId) -> FillAttempt {
        let mut state = self.state.lock();
        let VenueState { orders, ledger } = &mut *state;

        let Some(order) = orders.get_mut(broker_order_id) else {
            return FillAttempt::Gone;
        };
        if order.status() != OrderStatus::Pending {
            return FillAttempt::Gone;
        }

        let symbol = order.order().symbol().clone();
        let side = order.order().side();
        let price = self.quote(&symbol);

        if let Some(limit) = order.order().limit_price() {
            let crossed = match side {
                OrderSide::Buy => price <= limit,
                OrderSide::Sell => price >= limit,
            };
            if !crossed {
                debug!(%broker_order_id, %price, %limit, "Limit not reached");
                return FillAttempt::Waiting;
            }
        }

        let quantity = order.remaining_quantity();
        let fee = self.fee(quantity);
        let fill = Fill {
            price,
            quantity,
            fee,
            timestamp: Timestamp::now(),
        };

        if let Err(e) = order
            .record_fill(fill)
            .and_then(|()| order.finish(OrderStatus::Executed, None))
        {
            error!(%broker_order_id, error = %e, "Simulated fill refused");
            return FillAttempt::Gone;
        }
        ledger.apply(side, &symbol, quantity, price, fee);

        info!(
            %broker_order_id,
            symbol = %symbol,
            %price,
            %quantity,
            %fee,
            "Simulated order executed"
        );
        FillAttempt::Filled
    }
}

#[async_trait]
impl BrokerPort for SimulatedBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.inner.simulate_latency().await;

        if self.inner.roll_failure() {
            return Err(BrokerError::connection_failed(
                "Failed to connect to simulated venue",
            ));
        }

        self.inner.connected.store(true, Ordering::SeqCst);
        info!(broker = %self.inner.config.name, "Connected to simulated venue");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.inner.simulate_latency().await;
        self.inner.connected.store(false, Ordering::SeqCst);
        info!(broker = %self.inner.config.name, "Disconnected from simulated venue");
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderResult, BrokerError> {
        self.inner.ensure_connected()?;
        self.inner.simulate_latency().await;

        if self.inner.roll_failure() {
            return Err(
                BrokerError::order_rejected("Order rejected by simulated venue", true)
                    .with_details(format!("Simulated rejection for order {}", order.id())),
            );
        }

        let broker_order_id = BrokerOrderId::generate();
        let shadow = BrokerOrder::accept(broker_order_id.clone(), order.clone());
        let submitted_at = shadow.created_at();
        self.inner
            .state
            .lock()
            .orders
            .insert(broker_order_id.clone(), shadow);

        match order.order_type() {
            OrderType::Market | OrderType::Limit => self.schedule_fills(broker_order_id.clone()),
            OrderType::Stop => {
                debug!(%broker_order_id, "Stop order resting until cancelled");
            }
        }

        info!(
            %broker_order_id,
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            quantity = %order.quantity(),
            "Order placed with simulated venue"
        );

        Ok(OrderResult {
            broker_order_id,
            status: OrderStatus::Pending,
            fills: Vec::new(),
            submitted_at,
        })
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        self.inner.ensure_connected()?;
        self.inner.simulate_latency().await;

        if self.inner.roll_failure() {
            return Err(BrokerError::connection_failed("Cancel request dropped"));
        }

        let mut state = self.inner.state.lock();
        let Some(order) = state.orders.get_mut(broker_order_id) else {
            return Err(BrokerError::order_not_found(broker_order_id));
        };

        match order.status() {
            OrderStatus::Executed => Err(BrokerError::order_already_executed(broker_order_id)),
            OrderStatus::Cancelled | OrderStatus::Rejected => Ok(()),
            OrderStatus::Pending | OrderStatus::Approved => {
                if let Err(e) =
                    order.finish(OrderStatus::Cancelled, Some("cancelled by request".to_string()))
                {
                    warn!(%broker_order_id, error = %e, "Cancel raced a terminal update");
                }
                info!(%broker_order_id, "Order cancelled");
                Ok(())
            }
        }
    }

    async fn get_order_status(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<OrderStatusReport, BrokerError> {
        self.inner.ensure_connected()?;
        self.inner.simulate_latency().await;

        if self.inner.roll_failure() {
            return Err(BrokerError::connection_failed("Status request timed out"));
        }

        self.inner
            .state
            .lock()
            .orders
            .get(broker_order_id)
            .map(BrokerOrder::report)
            .ok_or_else(|| BrokerError::order_not_found(broker_order_id))
    }

    async fn get_account_info(&self) -> Result<AccountSnapshot, BrokerError> {
        self.inner.ensure_connected()?;
        self.inner.simulate_latency().await;

        if self.inner.roll_failure() {
            return Err(BrokerError::connection_failed("Account request timed out"));
        }

        Ok(self.inner.state.lock().ledger.snapshot())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.inner.config.name
    }
}
