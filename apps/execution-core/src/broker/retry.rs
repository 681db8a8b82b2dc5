//! Retry policies with exponential backoff.
//!
//! Delays grow as `initial_backoff * multiplier^n`, are capped at
//! `max_backoff`, and are spread by a symmetric jitter factor.
//!
//! # Classification
//!
//! | Category | Behaviour |
//! |----------|-----------|
//! | `Retryable` | retried with backoff until attempts run out |
//! | `RateLimited` | retried like `Retryable`, logged separately |
//! | `NonRetryable` | returned immediately |
//!
//! # Example
//!
//! ```rust,ignore
//! use execution_core::broker::{ExponentialBackoffCalculator, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let mut backoff = ExponentialBackoffCalculator::new(&policy);
//!
//! let delay1 = backoff.next_backoff(); // ~1s with jitter
//! let delay2 = backoff.next_backoff(); // ~2s with jitter
//! let delay3 = backoff.next_backoff(); // None: 3 attempts allow 2 waits
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy for calls across an unreliable boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the second attempt (default: 1s).
    pub initial_backoff: Duration,
    /// Upper bound on any single delay (default: 30s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            jitter_factor,
        }
    }

    /// Policy with `max_attempts` attempts and no waiting between them.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Calculator for exponential backoff with jitter.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current_attempt: u32,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a new backoff calculator from a retry policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            current_attempt: 0,
            max_retries: policy.max_attempts.saturating_sub(1),
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next attempt, or `None` once the attempts are spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }

        let base_backoff_ms = self.calculate_base_backoff_ms();
        let capped_ms = self.apply_jitter(base_backoff_ms).min(self.max_backoff_ms);

        self.current_attempt += 1;

        Some(Duration::from_millis(capped_ms))
    }

    fn calculate_base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.current_attempt as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    /// Uniform jitter in `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let jitter_range = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - jitter_range).max(0.0);
        let max = backoff_ms as f64 + jitter_range;

        rand::rng().random_range(min..=max) as u64
    }

    /// Number of delays handed out so far.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Check if more retries are available.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.current_attempt < self.max_retries
    }
}

/// Error categories for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Error is retryable (transient failure).
    Retryable,
    /// Error is not retryable (permanent failure).
    NonRetryable,
    /// Venue asked us to slow down.
    RateLimited,
}

/// Errors that know whether they are worth retrying.
pub trait Retryable {
    /// Classify this error.
    fn category(&self) -> ErrorCategory;

    /// Returns true unless the error is permanent.
    fn is_retryable(&self) -> bool {
        self.category() != ErrorCategory::NonRetryable
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },

    /// An attempt failed with a permanent error.
    #[error("permanent failure on attempt {attempts}: {error}")]
    Permanent {
        /// Attempts made.
        attempts: u32,
        /// The permanent error.
        error: E,
    },

    /// Cancellation was requested while waiting to retry.
    #[error("interrupted after {attempts} attempts")]
    Interrupted {
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt, if any attempt ran.
        last: Option<E>,
    },
}

impl<E: fmt::Display> RetryError<E> {
    /// Attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Permanent { attempts, .. }
            | Self::Interrupted { attempts, .. } => *attempts,
        }
    }

    /// The error that caused the give-up, if any.
    #[must_use]
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Permanent { error, .. } => Some(error),
            Self::Interrupted { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// `cancel` fires. A cancel drops the attempt in flight.
///
/// `op` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns a [`RetryError`] describing how the attempts ended.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut backoff = ExponentialBackoffCalculator::new(policy);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Interrupted {
                attempts: attempt,
                last: None,
            });
        }

        attempt += 1;
        debug!(operation, attempt, "Attempting");

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(operation, attempt, "Interrupted mid-attempt");
                return Err(RetryError::Interrupted {
                    attempts: attempt,
                    last: None,
                });
            }
            outcome = op(attempt) => outcome,
        };
        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let category = error.category();
        if category == ErrorCategory::NonRetryable {
            return Err(RetryError::Permanent {
                attempts: attempt,
                error,
            });
        }

        let Some(delay) = backoff.next_backoff() else {
            warn!(operation, attempts = attempt, error = %error, "Retries exhausted");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        };

        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            rate_limited = category == ErrorCategory::RateLimited,
            error = %error,
            "Attempt failed, backing off"
        );

        tokio::select! {
            () = cancel.cancelled() => {
                return Err(RetryError::Interrupted {
                    attempts: attempt,
                    last: Some(error),
                });
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}
