//! Retry and backoff for calls that cross an unreliable boundary.
//!
//! Broker calls and persistence calls share one policy type so that a
//! store outage is retried exactly like a venue hiccup.

mod retry;

pub use retry::{
    ErrorCategory, ExponentialBackoffCalculator, RetryError, RetryPolicy, Retryable,
    retry_with_backoff,
};
