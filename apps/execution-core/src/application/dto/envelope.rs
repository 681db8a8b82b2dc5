//! Message envelope shared by every topic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::shared::{MessageId, Timestamp};

/// Wrapper carried by every bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    /// Unique message identifier.
    pub message_id: MessageId,
    /// Topic the message is published to.
    pub topic: String,
    /// Publication time.
    pub timestamp: Timestamp,
    /// Publishing component.
    pub source: String,
    /// Payload.
    pub data: T,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl<T> MessageEnvelope<T> {
    /// Wrap `data` for publication on `topic`.
    pub fn new(topic: impl Into<String>, source: impl Into<String>, data: T) -> Self {
        Self {
            message_id: MessageId::generate(),
            topic: topic.into(),
            timestamp: Timestamp::now(),
            source: source.into(),
            data,
            metadata: BTreeMap::new(),
        }
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl<T: Serialize> MessageEnvelope<T> {
    /// Encode as a JSON value for the bus.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `data` cannot be encoded.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_serializes_with_snake_case_fields() {
        let envelope = MessageEnvelope::new("order.executed", "execution-core", json!({"x": 1}))
            .with_metadata("attempt", json!(2));

        let value = envelope.to_value().unwrap();
        assert_eq!(value["topic"], "order.executed");
        assert_eq!(value["source"], "execution-core");
        assert_eq!(value["data"]["x"], 1);
        assert_eq!(value["metadata"]["attempt"], 2);
        assert!(value["message_id"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let envelope = MessageEnvelope::new("t", "s", 1);
        let value = envelope.to_value().unwrap();
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn each_envelope_gets_a_fresh_id() {
        let a = MessageEnvelope::new("t", "s", ());
        let b = MessageEnvelope::new("t", "s", ());
        assert_ne!(a.message_id, b.message_id);
    }
}
