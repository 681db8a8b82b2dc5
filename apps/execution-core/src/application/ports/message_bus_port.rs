//! Message Bus Port (Driven Port)
//!
//! Narrow publish/subscribe contract over the inter-agent message bus.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::broker::{ErrorCategory, Retryable};

/// A raw message delivered on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// JSON payload, usually a `MessageEnvelope`.
    pub payload: serde_json::Value,
}

/// Message bus error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageBusError {
    /// Payload could not be encoded.
    #[error("Message serialization error: {0}")]
    Serialization(String),

    /// The bus cannot be reached.
    #[error("Message bus unavailable: {0}")]
    Unavailable(String),

    /// The bus has been shut down.
    #[error("Message bus closed")]
    Closed,
}

impl From<serde_json::Error> for MessageBusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Retryable for MessageBusError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unavailable(_) => ErrorCategory::Retryable,
            Self::Serialization(_) | Self::Closed => ErrorCategory::NonRetryable,
        }
    }
}

/// Port for the message bus.
#[async_trait]
pub trait MessageBusPort: Send + Sync {
    /// Publish a JSON payload to a topic.
    async fn publish(&self, topic: &str, payload: serde_json::Value)
    -> Result<(), MessageBusError>;

    /// Subscribe to a topic. Messages published after this call are
    /// delivered on the returned channel.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, MessageBusError>;
}
