//! Configuration module for the execution core.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for every component.
//!
//! # Usage
//!
//! ```rust,ignore
//! use execution_core::config::{Config, load_config};
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! // Access configuration values
//! println!("workers: {}", config.execution.worker_count);
//! ```

mod broker;
mod execution;
mod observability;
mod portfolio;
mod topics;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use broker::BrokerConfig;
pub use execution::{ExecutionConfig, RetryConfig};
pub use observability::{LOG_FORMATS, LoggingConfig};
pub use portfolio::{PortfolioConfig, RiskConfig};
pub use topics::TopicsConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Backoff settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Simulated venue settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Portfolio settings.
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    /// Risk gate limits.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Bus topics.
    #[serde(default)]
    pub topics: TopicsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns `ValidationError` naming the first offending field.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let execution = &config.execution;
    if execution.worker_count == 0 {
        return Err(invalid("execution.worker_count must be at least 1"));
    }
    if execution.queue_capacity == 0 {
        return Err(invalid("execution.queue_capacity must be at least 1"));
    }
    if execution.poll_interval_ms == 0 || execution.poll_interval_ms >= execution.order_timeout_ms
    {
        return Err(invalid(
            "execution.poll_interval_ms must be positive and below order_timeout_ms",
        ));
    }
    if execution.cancel_timeout_ms == 0 {
        return Err(invalid("execution.cancel_timeout_ms must be positive"));
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }
    if retry.backoff_multiplier < 1.0 {
        return Err(invalid("retry.backoff_multiplier must be >= 1.0"));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(invalid("retry.jitter_factor must be between 0.0 and 1.0"));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(invalid("retry.initial_backoff_ms must not exceed max_backoff_ms"));
    }

    let broker = &config.broker;
    if !(0.0..=1.0).contains(&broker.error_rate) {
        return Err(invalid("broker.error_rate must be between 0.0 and 1.0"));
    }
    if broker.fill_delay_min_ms > broker.fill_delay_max_ms {
        return Err(invalid(
            "broker.fill_delay_min_ms must not exceed fill_delay_max_ms",
        ));
    }
    for (field, value) in [
        ("broker.price_variation", broker.price_variation),
        ("broker.fee_per_share", broker.fee_per_share),
        ("broker.min_fee", broker.min_fee),
        ("broker.initial_cash", broker.initial_cash),
        ("portfolio.initial_cash", config.portfolio.initial_cash),
    ] {
        if value < Decimal::ZERO {
            return Err(invalid(format!("{field} cannot be negative")));
        }
    }
    if broker.default_price <= Decimal::ZERO
        || broker.reference_prices.values().any(|p| *p <= Decimal::ZERO)
    {
        return Err(invalid("broker reference prices must be positive"));
    }

    let risk = &config.risk;
    if risk.max_position_fraction <= Decimal::ZERO || risk.max_position_fraction > Decimal::ONE {
        return Err(invalid("risk.max_position_fraction must be in (0, 1]"));
    }
    if risk.cash_buffer_fraction < Decimal::ZERO || risk.cash_buffer_fraction >= Decimal::ONE {
        return Err(invalid("risk.cash_buffer_fraction must be in [0, 1)"));
    }
    if risk.max_order_quantity <= Decimal::ZERO {
        return Err(invalid("risk.max_order_quantity must be positive"));
    }

    if config.portfolio.id.trim().is_empty() {
        return Err(invalid("portfolio.id cannot be empty"));
    }

    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(invalid(format!(
            "logging.format must be one of: {LOG_FORMATS:?}"
        )));
    }

    Ok(())
}
