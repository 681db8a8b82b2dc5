//! Simulated venue configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Settings for the simulated broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Venue name reported in events.
    #[serde(default = "default_name")]
    pub name: String,
    /// Latency added to every call.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Probability that any call fails transiently.
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    /// Lower bound of the asynchronous fill delay.
    #[serde(default = "default_fill_delay_min_ms")]
    pub fill_delay_min_ms: u64,
    /// Upper bound of the asynchronous fill delay.
    #[serde(default = "default_fill_delay_max_ms")]
    pub fill_delay_max_ms: u64,
    /// Maximum absolute deviation of a fill from the reference price.
    #[serde(default = "default_price_variation")]
    pub price_variation: Decimal,
    /// Reference price for symbols without an entry in `reference_prices`.
    #[serde(default = "default_price")]
    pub default_price: Decimal,
    /// Per-share fee.
    #[serde(default = "default_fee_per_share")]
    pub fee_per_share: Decimal,
    /// Fee floor per fill.
    #[serde(default = "default_min_fee")]
    pub min_fee: Decimal,
    /// Opening cash of the venue-side ledger.
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,
    /// Reference price per symbol.
    #[serde(default)]
    pub reference_prices: BTreeMap<String, Decimal>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            latency_ms: default_latency_ms(),
            error_rate: default_error_rate(),
            fill_delay_min_ms: default_fill_delay_min_ms(),
            fill_delay_max_ms: default_fill_delay_max_ms(),
            price_variation: default_price_variation(),
            default_price: default_price(),
            fee_per_share: default_fee_per_share(),
            min_fee: default_min_fee(),
            initial_cash: default_initial_cash(),
            reference_prices: BTreeMap::new(),
        }
    }
}

fn default_name() -> String {
    "simulated".to_string()
}

const fn default_latency_ms() -> u64 {
    100
}

const fn default_error_rate() -> f64 {
    0.01
}

const fn default_fill_delay_min_ms() -> u64 {
    50
}

const fn default_fill_delay_max_ms() -> u64 {
    500
}

const fn default_price_variation() -> Decimal {
    dec!(1.00)
}

const fn default_price() -> Decimal {
    dec!(100)
}

const fn default_fee_per_share() -> Decimal {
    dec!(0.005)
}

const fn default_min_fee() -> Decimal {
    dec!(1.00)
}

const fn default_initial_cash() -> Decimal {
    dec!(100000)
}
