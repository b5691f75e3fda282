//! Retry with capped exponential backoff.
//!
//! Attempt *k* that fails with a transient error waits `base * 2^(k-1)`
//! (capped at `max_delay`) before attempt *k + 1*. A rate-limit hint from the
//! error replaces the computed delay, still capped. Non-transient errors are
//! returned immediately as [`RetryError::Permanent`].

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::clock::Clock;

/// Classifies an error as worth retrying.
pub trait Transient {
    /// Timeouts, connection resets and rate limits are transient.
    fn is_transient(&self) -> bool;

    /// Server-provided delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Why a retried operation ultimately failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The last underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Attempt count and delay bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Shared retry policy for navigation, scrolling and refinement calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        clock: &dyn Clock,
        operation: &str,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(operation, attempts = attempt, error = %e, "retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = e
                        .retry_after()
                        .map(|d| d.min(self.max_delay))
                        .unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Free-function form of [`RetryPolicy::run`].
pub async fn with_retry<T, E, F, Fut>(
    clock: &dyn Clock,
    operation: &str,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    RetryPolicy::new(max_attempts, base_delay, max_delay)
        .run(clock, operation, op)
        .await
}
