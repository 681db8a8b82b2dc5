//! Tracing Setup
//!
//! Installs a `tracing-subscriber` fmt subscriber driven by [`LoggingConfig`].
//!
//! # Configuration
//!
//! - `RUST_LOG`: overrides the configured filter when set
//! - `logging.level`: default level (`info`)
//! - `logging.format`: `pretty` for humans, `json` for log shippers
//!
//! # Usage
//!
//! ```rust,ignore
//! use execution_core::telemetry::init_tracing;
//!
//! init_tracing(&config.logging);
//! ```

use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, otherwise the configured level for
/// everything plus the same level for this crate.
#[must_use]
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level.to_lowercase();
        EnvFilter::try_new(format!("{level},execution_core={level}"))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Initialize tracing.
///
/// Returns false if a global subscriber was already installed, which happens
/// when tests or an embedding binary set one up first.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = build_filter(config);

    let installed = if config.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .finish()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .finish()
            .try_init()
    };

    match installed {
        Ok(()) => {
            tracing::info!(
                level = %config.level,
                format = %config.format,
                "Tracing initialized"
            );
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }

    #[test]
    fn bad_level_falls_back() {
        let config = LoggingConfig {
            level: "not a level!!".to_string(),
            format: "pretty".to_string(),
        };
        // Must not panic.
        let _ = build_filter(&config);
    }
}
