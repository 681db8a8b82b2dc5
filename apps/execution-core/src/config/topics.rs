//! Bus topic names.

use serde::{Deserialize, Serialize};

/// Topics consumed and produced by the execution core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Approved orders (consumed).
    #[serde(default = "default_order_approved")]
    pub order_approved: String,
    /// Executed orders.
    #[serde(default = "default_order_executed")]
    pub order_executed: String,
    /// Orders that failed during execution.
    #[serde(default = "default_order_failed")]
    pub order_failed: String,
    /// Orders refused by the risk gate.
    #[serde(default = "default_order_rejected")]
    pub order_rejected: String,
    /// Portfolio snapshots after each fill.
    #[serde(default = "default_portfolio_update")]
    pub portfolio_update: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            order_approved: default_order_approved(),
            order_executed: default_order_executed(),
            order_failed: default_order_failed(),
            order_rejected: default_order_rejected(),
            portfolio_update: default_portfolio_update(),
        }
    }
}

fn default_order_approved() -> String {
    "order.approved".to_string()
}

fn default_order_executed() -> String {
    "order.executed".to_string()
}

fn default_order_failed() -> String {
    "order.failed".to_string()
}

fn default_order_rejected() -> String {
    "order.rejected".to_string()
}

fn default_portfolio_update() -> String {
    "portfolio.update".to_string()
}
