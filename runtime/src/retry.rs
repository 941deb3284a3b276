//! Bounded retry for side-effecting steps of the commit pipeline.
//!
//! [`ActionExecutor::try_action`] runs a unit of work up to `max_attempts` times.
//! Errors and panics inside the work are logged and counted as failed attempts; they
//! never propagate. The first successful attempt stops the loop and its value is
//! returned, so whatever the caller does with `Some(value)` runs exactly once.
//! Exhaustion is silent apart from logs and metrics: callers that need a visible
//! failure decide that themselves (see [`ExhaustedPolicy`]).
//!
//! # Example
//!
//! ```rust
//! use commitflow_runtime::retry::{ActionExecutor, RetryPolicy};
//!
//! # async fn example() {
//! let executor = ActionExecutor::new();
//! let policy = RetryPolicy::builder().max_attempts(3).build();
//!
//! let value = executor
//!     .try_action("Compute", &policy, || async { Ok::<_, String>(42) })
//!     .await;
//!
//! assert_eq!(value, Some(42));
//! # }
//! ```

use crate::metrics::ActionMetrics;
use commitflow_core::panic_message;
use futures::FutureExt;
use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for one kind of action.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `initial_delay`: zero (attempts follow each other immediately)
/// - `max_delay`: 1 second
/// - `multiplier`: 2.0
/// - `jitter`: off
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: false,
        }
    }

    /// Calculate the delay after the failed attempt `attempt` (0-indexed).
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, optionally jittered.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        #[allow(clippy::cast_possible_wrap)]
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            capped_secs * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Set the total number of attempts.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the delay before the second attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay between attempts.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter,
        }
    }
}

/// What the commit pipeline does when its outermost retry is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Give up silently. The command layer's own timeout is the backstop.
    #[default]
    Abandon,
    /// Report the command as failed.
    NotifyFailed,
}

/// Runs actions under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionExecutor;

impl ActionExecutor {
    /// Create a new executor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Run `action` until it succeeds or `policy.max_attempts` attempts were made.
    ///
    /// Returns `Some(value)` of the first successful attempt, `None` on exhaustion.
    /// A policy with `max_attempts == 0` still makes one attempt.
    pub async fn try_action<F, Fut, T, E>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        mut action: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 0..max_attempts {
            ActionMetrics::record_attempt(name);

            let outcome = AssertUnwindSafe(async { action().await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(value)) => {
                    if attempt > 0 {
                        tracing::info!(action = name, attempt = attempt + 1, "Action succeeded after retry");
                    }
                    return Some(value);
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        action = name,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "Action attempt failed"
                    );
                }
                Err(panic) => {
                    tracing::error!(
                        action = name,
                        attempt = attempt + 1,
                        max_attempts,
                        panic = panic_message(panic.as_ref()),
                        "Action attempt panicked"
                    );
                }
            }

            if attempt + 1 < max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }

        tracing::error!(action = name, max_attempts, "Action failed after max attempts");
        ActionMetrics::record_exhausted(name);
        None
    }
}
