//! Bounded retry with backoff.
//!
//! [`retry_with_backoff`] re-invokes an async operation until it succeeds,
//! returns an error the caller classifies as not retryable, or runs out of
//! attempts. The delay between attempts comes from a [`Backoff`] curve and
//! is slept through a [`Sleeper`], so the combinator has no timer dependency
//! and tests can observe every delay without waiting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::RetryPolicy;

/// Waits for a given duration.
///
/// The production implementation wraps the async runtime's timer; tests use
/// [`crate::fakes::RecordingSleeper`].
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Waits `unit * k` after the `k`-th failed attempt.
    Linear {
        /// Length of one backoff unit.
        unit: Duration,
    },
    /// Waits the same delay after every failure.
    Fixed {
        /// The delay.
        delay: Duration,
    },
}

impl Backoff {
    /// Delay to sleep after `failed_attempts` attempts have failed (1-based).
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let k = failed_attempts.max(1);
        match *self {
            Backoff::Linear { unit } => unit.saturating_mul(k),
            Backoff::Fixed { delay } => delay,
        }
    }
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Never less than one.
    pub max_attempts: u32,

    /// Delay curve between attempts.
    pub backoff: Backoff,
}

impl RetryConfig {
    /// Creates a retry configuration. `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt with no retry.
    pub fn once() -> Self {
        Self::new(1, Backoff::Fixed {
            delay: Duration::ZERO,
        })
    }

    /// The delays slept between consecutive attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|k| self.backoff.delay_after(k))
    }

    /// Total time slept when every attempt fails.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

/// Result of [`retry_with_backoff`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded.
    Success(T),

    /// Every attempt failed with a retryable error.
    Exhausted {
        /// The error from the final attempt.
        last_error: E,
        /// Number of attempts made.
        attempts: u32,
    },

    /// An attempt failed with an error that must not be retried.
    Aborted(E),
}

impl<T, E> RetryOutcome<T, E> {
    /// Converts to a `Result`, treating exhaustion and abort as `Err`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Success(v) => Ok(v),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
            RetryOutcome::Aborted(e) => Err(e),
        }
    }
}

/// Executes an async operation with bounded retry.
///
/// `operation` is called up to `config.max_attempts` times. After the `k`-th
/// failure, if `classify` marks the error retryable and attempts remain, the
/// combinator sleeps `config.backoff.delay_after(k)` and tries again. A
/// minimum delay carried by the error (e.g. from `Retry-After`) lengthens
/// that sleep but never shortens it. No sleep happens after the last attempt.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    config: RetryConfig,
    sleeper: &dyn Sleeper,
    classify: C,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryPolicy,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(e) => {
                attempt += 1;

                let hint = match classify(&e) {
                    RetryPolicy::Retryable { after } => after,
                    RetryPolicy::NonRetryable => return RetryOutcome::Aborted(e),
                };
                if attempt >= config.max_attempts {
                    return RetryOutcome::Exhausted {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let delay = config
                    .backoff
                    .delay_after(attempt)
                    .max(hint.unwrap_or(Duration::ZERO));
                debug!(
                    attempt,
                    tries_left = config.max_attempts - attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Attempt failed, backing off"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
