//! Execution Core Binary
//!
//! Starts the execution coordinator against the simulated venue.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin execution-core
//! ```
//!
//! # Environment Variables
//!
//! - `EXECUTION_CONFIG`: Path to the YAML config (default: config.yaml)
//! - `RUST_LOG`: Log filter, overrides `logging.level`
//!
//! Any `${VAR}` or `${VAR:-default}` inside the config file is resolved from
//! the environment, including variables loaded from `.env`.

use std::sync::Arc;

use anyhow::Context;
use execution_core::application::services::{
    CoordinatorSettings, ExecutionCoordinator, FillApplier,
};
use execution_core::application::use_cases::{
    ExecuteOrderUseCase, ExecutionSettings, ReconcileAccountUseCase,
};
use execution_core::config::{Config, load_config};
use execution_core::domain::portfolio::{Portfolio, PortfolioRepository};
use execution_core::domain::shared::PortfolioId;
use execution_core::infrastructure::broker::SimulatedBroker;
use execution_core::infrastructure::messaging::InMemoryMessageBus;
use execution_core::infrastructure::persistence::{
    InMemoryOrderRepository, InMemoryPortfolioRepository,
};
use execution_core::telemetry::init_tracing;
use execution_core::BrokerPort;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::signal;

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "EXECUTION_CONFIG";

/// Cash and share differences ignored by the closing reconciliation.
const RECONCILE_TOLERANCE: Decimal = dec!(0.01);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config_path = std::env::var(CONFIG_ENV).ok();
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    tracing::info!("Starting execution core");
    log_config(&config);

    let broker = Arc::new(SimulatedBroker::new(config.broker.clone()));
    let orders = Arc::new(InMemoryOrderRepository::new());
    let portfolios = Arc::new(InMemoryPortfolioRepository::new());
    let bus = Arc::new(InMemoryMessageBus::with_capacity(
        config.execution.queue_capacity,
    ));

    let portfolio = open_portfolio(&config, portfolios.as_ref()).await?;
    let fills = Arc::new(FillApplier::new(portfolio));

    let executor = Arc::new(ExecuteOrderUseCase::new(
        Arc::clone(&broker),
        orders,
        portfolios,
        Arc::clone(&bus),
        Arc::clone(&fills),
        ExecutionSettings::from_config(&config),
    ));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        executor,
        bus,
        CoordinatorSettings::from_config(&config),
    ));
    coordinator
        .start()
        .await
        .context("Failed to start execution coordinator")?;

    tracing::info!("Execution core ready");

    shutdown_signal().await;

    let report = coordinator.shutdown().await;
    reconcile(broker, fills).await;

    tracing::info!(drained = report.drained, "Execution core stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the loaded configuration.
fn log_config(config: &Config) {
    tracing::info!(
        workers = config.execution.worker_count,
        poll_interval_ms = config.execution.poll_interval_ms,
        order_timeout_ms = config.execution.order_timeout_ms,
        max_attempts = config.retry.max_attempts,
        broker = %config.broker.name,
        portfolio = %config.portfolio.id,
        "Configuration loaded"
    );
}

/// Load the saved portfolio, or open and save a fresh one.
async fn open_portfolio(
    config: &Config,
    portfolios: &InMemoryPortfolioRepository,
) -> anyhow::Result<Portfolio> {
    let id = PortfolioId::new(config.portfolio.id.as_str());
    if let Some(existing) = portfolios
        .get(&id)
        .await
        .context("Failed to load portfolio")?
    {
        return Ok(existing);
    }

    let portfolio = Portfolio::new(id, config.portfolio.initial_cash);
    portfolios
        .save(&portfolio)
        .await
        .context("Failed to save opening portfolio")?;
    Ok(portfolio)
}

/// Compare the portfolio with the venue one last time.
async fn reconcile(broker: Arc<SimulatedBroker>, fills: Arc<FillApplier>) {
    if let Err(e) = broker.connect().await {
        tracing::warn!(error = %e, "Skipping reconciliation, venue unreachable");
        return;
    }

    match ReconcileAccountUseCase::new(Arc::clone(&broker), fills, RECONCILE_TOLERANCE)
        .execute()
        .await
    {
        Ok(report) => tracing::info!(
            clean = report.is_clean(),
            cash_drift = %report.cash_drift,
            "Closing reconciliation"
        ),
        Err(e) => tracing::warn!(error = %e, "Closing reconciliation failed"),
    }

    if let Err(e) = broker.disconnect().await {
        tracing::warn!(error = %e, "Venue disconnect failed");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
