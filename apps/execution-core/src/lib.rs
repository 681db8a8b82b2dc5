// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Execution Core - Rust Core Library
//!
//! Order execution and portfolio accounting for the trading system: takes
//! approved orders off the message bus, drives them through a broker with
//! bounded retries, books fills into the portfolio exactly once and publishes
//! the outcome.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic
//!   - `order_execution`: Order aggregate, status lifecycle, repository trait
//!   - `portfolio`: Positions, cost basis, realized/unrealized P&L
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: `BrokerPort`, `MessageBusPort`, `RiskGatePort`
//!   - `services`: `FillApplier`, `ExecutionCoordinator`
//!   - `use_cases`: `ApproveOrder`, `ExecuteOrder`, `ReconcileAccount`
//!   - `dto`: Message envelope and bus payloads
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: Simulated venue with its own account ledger
//!   - `persistence`: In-memory order and portfolio repositories
//!   - `messaging`: In-memory topic bus
//!   - `risk`: Limits-based risk gate
//!
//! Cross-cutting: `broker` (retry/backoff), `config`, `error`, `telemetry`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Retry policy and exponential backoff for unreliable boundaries.
pub mod broker;

/// YAML configuration with environment interpolation.
pub mod config;

/// Error aggregation at the coordinator boundary.
pub mod error;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order_execution::{
    CreateOrderCommand, Order, OrderError, OrderSide, OrderStatus, OrderType,
};
pub use domain::portfolio::{Portfolio, PortfolioError, PortfolioSnapshot, Position};
pub use domain::shared::{BrokerOrderId, OrderId, PortfolioId, Symbol, Timestamp};

// Application re-exports
pub use application::ports::{BrokerError, BrokerPort, MessageBusPort, RiskGatePort};
pub use application::services::{ExecutionCoordinator, FillApplier};
pub use application::use_cases::{
    ApproveOrderUseCase, ExecuteOrderUseCase, ExecutionOutcome, ReconcileAccountUseCase,
};

// Cross-cutting re-exports
pub use broker::{RetryPolicy, retry_with_backoff};
pub use config::{Config, load_config};
pub use error::ExecutionError;

// Infrastructure re-exports
pub use infrastructure::broker::SimulatedBroker;
pub use infrastructure::messaging::InMemoryMessageBus;
pub use infrastructure::persistence::{InMemoryOrderRepository, InMemoryPortfolioRepository};
pub use infrastructure::risk::LimitsRiskGate;
