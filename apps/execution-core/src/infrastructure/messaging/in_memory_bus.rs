//! In-process message bus.
//!
//! Fans each published payload out to every live subscriber of the topic and
//! keeps a log of everything published, which tests read back.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::application::ports::{BusMessage, MessageBusError, MessageBusPort};

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// In-memory implementation of `MessageBusPort`.
#[derive(Debug)]
pub struct InMemoryMessageBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>,
    published: Mutex<Vec<BusMessage>>,
    capacity: usize,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    /// Create a bus with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a bus whose subscriber channels buffer `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Everything published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.lock().clone()
    }

    /// Payloads published on one topic, oldest first.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBusPort for InMemoryMessageBus {
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), MessageBusError> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        self.published.lock().push(message.clone());

        let senders: Vec<_> = {
            let mut subscribers = self.subscribers.lock();
            let Some(senders) = subscribers.get_mut(topic) else {
                trace!(topic, "No subscribers");
                return Ok(());
            };
            senders.retain(|s| !s.is_closed());
            senders.clone()
        };

        for sender in senders {
            // A subscriber that went away between the snapshot and now is
            // pruned on the next publish.
            let _ = sender.send(message.clone()).await;
        }
        debug!(topic, "Published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<BusMessage>, MessageBusError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        debug!(topic, "Subscribed");
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_to_every_subscriber_of_topic() {
        let bus = InMemoryMessageBus::new();
        let mut a = bus.subscribe("order.approved").await.unwrap();
        let mut b = bus.subscribe("order.approved").await.unwrap();
        let mut other = bus.subscribe("order.executed").await.unwrap();

        bus.publish("order.approved", json!({"n": 1})).await.unwrap();

        assert_eq!(a.recv().await.unwrap().payload, json!({"n": 1}));
        assert_eq!(b.recv().await.unwrap().payload, json!({"n": 1}));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn records_published_messages() {
        let bus = InMemoryMessageBus::new();
        bus.publish("a", json!(1)).await.unwrap();
        bus.publish("b", json!(2)).await.unwrap();
        bus.publish("a", json!(3)).await.unwrap();

        assert_eq!(bus.published().len(), 3);
        assert_eq!(bus.published_on("a"), vec![json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_publish() {
        let bus = InMemoryMessageBus::with_capacity(1);
        let rx = bus.subscribe("t").await.unwrap();
        drop(rx);

        bus.publish("t", json!(1)).await.unwrap();
        bus.publish("t", json!(2)).await.unwrap();
        assert_eq!(bus.published_on("t").len(), 2);
    }
}
