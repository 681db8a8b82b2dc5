//! Strongly-typed identifiers for domain entities.
//!
//! Generated identifiers are UUID v4 strings, so they never collide across
//! processes and never depend on wall-clock time.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from an existing string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is blank.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(OrderId, "Unique identifier for an order, assigned at creation.");
define_id!(BrokerOrderId, "Venue-assigned identifier for a placed order.");
define_id!(PortfolioId, "Identifier of a portfolio ledger.");
define_id!(MessageId, "Identifier of a published bus message.");

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn order_id_new_and_display() {
        let id = OrderId::new("ord-123");
        assert_eq!(id.as_str(), "ord-123");
        assert_eq!(format!("{id}"), "ord-123");
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<OrderId> = (0..1_000).map(|_| OrderId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn generated_id_is_uuid() {
        let id = BrokerOrderId::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn blank_id_is_empty() {
        assert!(OrderId::new("  ").is_empty());
        assert!(!OrderId::new("x").is_empty());
    }

    #[test]
    fn serde_is_transparent() {
        let id = PortfolioId::new("default");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"default\"");
    }
}
