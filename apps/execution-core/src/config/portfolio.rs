//! Portfolio and risk gate configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Portfolio owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Portfolio identifier.
    #[serde(default = "default_portfolio_id")]
    pub id: String,
    /// Starting cash when no saved portfolio exists.
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            id: default_portfolio_id(),
            initial_cash: default_initial_cash(),
        }
    }
}

fn default_portfolio_id() -> String {
    "default".to_string()
}

const fn default_initial_cash() -> Decimal {
    dec!(100000)
}

/// Limits applied by the reference risk gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Largest post-trade position value as a fraction of total value.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
    /// Extra cash a buy must cover, as a fraction of its notional.
    #[serde(default = "default_cash_buffer_fraction")]
    pub cash_buffer_fraction: Decimal,
    /// Largest accepted order quantity.
    #[serde(default = "default_max_order_quantity")]
    pub max_order_quantity: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_fraction: default_max_position_fraction(),
            cash_buffer_fraction: default_cash_buffer_fraction(),
            max_order_quantity: default_max_order_quantity(),
        }
    }
}

const fn default_max_position_fraction() -> Decimal {
    dec!(0.25)
}

const fn default_cash_buffer_fraction() -> Decimal {
    dec!(0.10)
}

const fn default_max_order_quantity() -> Decimal {
    dec!(10000)
}
