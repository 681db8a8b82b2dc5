//! Coordinator Lifecycle Integration Tests
//!
//! Intake filtering, at-most-once admission, deadlines and shutdown:
//! - Redelivered approved orders execute once
//! - Malformed and non-approved messages are dropped without stalling intake
//! - Orders that never finish are cancelled at the deadline
//! - Shutdown drains, or interrupts at its own deadline
//! - A venue that stops answering cannot hold an order or shutdown hostage

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{STARTING_CASH, ScriptedBroker, Timing, approved, harness, market_buy};
use execution_core::application::dto::{MessageEnvelope, OrderFailedMessage};
use execution_core::application::ports::{BrokerPort, MessageBusPort};
use execution_core::application::services::Admission;
use execution_core::application::use_cases::ExecutionOutcome;
use execution_core::domain::order_execution::{
    CreateOrderCommand, Order, OrderRepository, OrderSide, OrderStatus,
};
use execution_core::domain::portfolio::PortfolioRepository;
use execution_core::domain::shared::{PortfolioId, Symbol};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::assert_ok;

fn scripted() -> Arc<ScriptedBroker> {
    Arc::new(ScriptedBroker::new(dec!(150.00), dec!(1.00)))
}

async fn wait_for_placement(broker: &ScriptedBroker) {
    while broker.place_calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================
// Intake
// ============================================

#[tokio::test(start_paused = true)]
async fn test_redelivered_message_executes_once() {
    let broker = scripted();
    let mut h = harness(Arc::clone(&broker), Timing::default());
    h.coordinator.start().await.unwrap();

    let order = market_buy("AAPL", dec!(10));
    let payload = MessageEnvelope::new("order.approved", "risk-gate", &order)
        .to_value()
        .unwrap();
    h.bus.publish("order.approved", payload.clone()).await.unwrap();
    h.bus.publish("order.approved", payload).await.unwrap();

    assert!(h.next_outcome().await.is_executed());
    assert_eq!(h.coordinator.submit(order).await, Admission::Duplicate);

    let report = h.coordinator.shutdown().await;
    assert!(report.drained);
    assert_eq!(broker.place_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.bus.published_on("order.executed").len(), 1);
    assert_eq!(STARTING_CASH - h.fills.snapshot().cash, dec!(1501.00));
}

#[tokio::test(start_paused = true)]
async fn test_bad_messages_are_dropped_and_intake_continues() {
    let broker = scripted();
    let mut h = harness(Arc::clone(&broker), Timing::default());
    h.coordinator.start().await.unwrap();

    let pending = Order::new(CreateOrderCommand::market("MSFT", OrderSide::Buy, dec!(5))).unwrap();
    let valid = market_buy("AAPL", dec!(10));

    h.bus
        .publish("order.approved", json!({ "garbage": true }))
        .await
        .unwrap();
    h.bus
        .publish("order.approved", serde_json::to_value(&pending).unwrap())
        .await
        .unwrap();
    h.bus
        .publish("order.approved", serde_json::to_value(&valid).unwrap())
        .await
        .unwrap();

    let ExecutionOutcome::Executed { order, .. } = h.next_outcome().await else {
        panic!("expected the valid order to execute");
    };
    assert_eq!(order.id(), valid.id());

    h.coordinator.shutdown().await;
    assert_eq!(broker.place_calls.load(Ordering::SeqCst), 1);
    assert!(h.orders.get(pending.id()).await.unwrap().is_none());
    assert_eq!(h.fills.snapshot().quantity(&Symbol::new("MSFT")), dec!(0));
}

// ============================================
// Deadlines
// ============================================

#[tokio::test(start_paused = true)]
async fn test_order_that_never_finishes_is_cancelled_at_deadline() {
    let broker = scripted();
    broker.hold_orders();
    let mut h = harness(
        Arc::clone(&broker),
        Timing {
            order_timeout: Duration::from_secs(1),
            ..Timing::default()
        },
    );
    h.coordinator.start().await.unwrap();

    let order = market_buy("AAPL", dec!(10));
    h.coordinator.submit(order.clone()).await;

    let ExecutionOutcome::Failed {
        order: failed,
        error_code,
        reason,
        ..
    } = h.next_outcome().await
    else {
        panic!("expected the order to time out");
    };
    assert_eq!(error_code, "TIMEOUT");
    assert_eq!(reason, "timed out");
    assert_eq!(failed.status(), OrderStatus::Rejected);
    assert_eq!(failed.status_reason(), Some("timed out"));
    assert_eq!(broker.cancel_calls.load(Ordering::SeqCst), 1);

    let events = h.bus.published_on("order.failed");
    assert_eq!(events.len(), 1);
    let event: MessageEnvelope<OrderFailedMessage> =
        serde_json::from_value(events[0].clone()).unwrap();
    assert_eq!(event.data.error_code, "TIMEOUT");
    assert!(event.data.broker_order_id.is_some());

    let stored = h.orders.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Rejected);
    assert_eq!(h.fills.snapshot().cash, STARTING_CASH);

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_status_read_cannot_outlive_order_deadline() {
    let broker = scripted();
    broker.hold_orders();
    broker.stall_status_reads(Duration::from_secs(3600));
    let mut h = harness(
        Arc::clone(&broker),
        Timing {
            order_timeout: Duration::from_secs(1),
            ..Timing::default()
        },
    );
    h.coordinator.start().await.unwrap();

    let started = tokio::time::Instant::now();
    h.coordinator.submit(market_buy("AAPL", dec!(10))).await;

    let ExecutionOutcome::Failed {
        order, error_code, ..
    } = h.next_outcome().await
    else {
        panic!("expected the order to time out");
    };
    // Deadline plus one bounded final read.
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert_eq!(error_code, "TIMEOUT");
    assert_eq!(order.status(), OrderStatus::Rejected);
    assert_eq!(broker.cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.fills.snapshot().cash, STARTING_CASH);

    let report = h.coordinator.shutdown().await;
    assert!(report.drained);
}

// ============================================
// Shutdown
// ============================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_orders() {
    let broker = scripted();
    let mut h = harness(Arc::clone(&broker), Timing::default());
    h.coordinator.start().await.unwrap();

    for symbol in ["AAPL", "MSFT", "NVDA", "AMZN", "GOOG", "META"] {
        assert_eq!(
            h.coordinator.submit(market_buy(symbol, dec!(10))).await,
            Admission::Queued
        );
    }

    let report = h.coordinator.shutdown().await;
    assert!(report.drained);
    assert!(!broker.is_connected());

    let mut executed = 0;
    while let Ok(outcome) = h.outcomes.try_recv() {
        assert!(outcome.is_executed(), "{outcome:?}");
        executed += 1;
    }
    assert_eq!(executed, 6);

    // Six buys of 10 @ 150 with a 1.00 fee each.
    let snapshot = h.fills.snapshot();
    assert_eq!(STARTING_CASH - snapshot.cash, dec!(9006.00));
    assert_eq!(snapshot.total_fees, dec!(6.00));
    assert_eq!(snapshot.positions.len(), 6);

    // The last portfolio write carries every fill.
    let saved = h
        .portfolios
        .get(&PortfolioId::new("main"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.cash(), snapshot.cash);
    assert_eq!(saved.positions().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_interrupts_and_cancels() {
    let broker = scripted();
    broker.hold_orders();
    let mut h = harness(
        Arc::clone(&broker),
        Timing {
            order_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(1),
            ..Timing::default()
        },
    );
    assert_ok!(h.coordinator.start().await);

    let order = market_buy("AAPL", dec!(10));
    h.coordinator.submit(order.clone()).await;
    wait_for_placement(&broker).await;

    let report = h.coordinator.shutdown().await;
    assert!(!report.drained);
    assert!(!broker.is_connected());

    let ExecutionOutcome::Failed {
        order: failed,
        error_code,
        ..
    } = h.next_outcome().await
    else {
        panic!("expected the order to be interrupted");
    };
    assert_eq!(error_code, "INTERRUPTED");
    assert_eq!(failed.status(), OrderStatus::Cancelled);
    assert_eq!(failed.status_reason(), Some("interrupted"));
    assert_eq!(broker.cancel_calls.load(Ordering::SeqCst), 1);

    let stored = h.orders.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Cancelled);
    assert_eq!(h.bus.published_on("order.failed").len(), 1);
    assert_eq!(h.fills.snapshot().cash, STARTING_CASH);
}

#[tokio::test(start_paused = true)]
async fn test_limit_order_sells_through_the_pipeline() {
    let broker = scripted();
    let mut h = harness(Arc::clone(&broker), Timing::default());
    h.coordinator.start().await.unwrap();

    h.coordinator.submit(market_buy("AAPL", dec!(20))).await;
    assert!(h.next_outcome().await.is_executed());

    let sell = approved(CreateOrderCommand::limit(
        "AAPL",
        OrderSide::Sell,
        dec!(20),
        dec!(149.00),
    ));
    h.coordinator.submit(sell).await;
    assert!(h.next_outcome().await.is_executed());

    let snapshot = h.fills.snapshot();
    assert!(snapshot.positions.get(&Symbol::new("AAPL")).is_none_or(|q| q.is_zero()));
    assert_eq!(snapshot.realized_pnl, dec!(0));
    assert_eq!(STARTING_CASH - snapshot.cash, dec!(2.00));

    h.coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_bounded_when_venue_stops_answering() {
    let broker = scripted();
    broker.hold_orders();
    broker.stall_status_reads(Duration::from_secs(3600));
    let mut h = harness(
        Arc::clone(&broker),
        Timing {
            order_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(2),
            ..Timing::default()
        },
    );
    h.coordinator.start().await.unwrap();

    h.coordinator.submit(market_buy("AAPL", dec!(10))).await;
    wait_for_placement(&broker).await;

    let started = tokio::time::Instant::now();
    let report = h.coordinator.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert!(!report.drained);
    assert!(!broker.is_connected());

    let ExecutionOutcome::Failed {
        order, error_code, ..
    } = h.next_outcome().await
    else {
        panic!("expected the order to be interrupted");
    };
    assert_eq!(error_code, "INTERRUPTED");
    assert_eq!(order.status(), OrderStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_orders_stuck_after_interrupt() {
    let broker = scripted();
    broker.hold_orders();
    broker.stall_status_reads(Duration::from_secs(3600));
    let mut h = harness(
        Arc::clone(&broker),
        Timing {
            order_timeout: Duration::from_secs(60),
            // The abandon path itself outlasts the second grace period.
            cancel_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(2),
            ..Timing::default()
        },
    );
    h.coordinator.start().await.unwrap();

    h.coordinator.submit(market_buy("AAPL", dec!(10))).await;
    wait_for_placement(&broker).await;

    let started = tokio::time::Instant::now();
    let report = h.coordinator.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert!(!report.drained);
    assert!(!broker.is_connected());
    // The aborted worker never reported.
    assert!(h.outcomes.try_recv().is_err());
    assert_eq!(h.fills.snapshot().cash, STARTING_CASH);
}
