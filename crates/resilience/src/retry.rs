// crates/resilience/src/retry.rs
//! Retry policies with exponential backoff

use crate::error::{ResilienceError, ResilienceResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy configuration
///
/// `retries` counts the extra attempts after the first one, so a policy of
/// `RetryPolicy::new(3)` makes at most four calls.
///
/// Delays double per attempt and strictly increase only while below
/// `max_delay`; from then on every retry waits exactly `max_delay`. With the
/// defaults (1s base, 30s cap) the first five delays grow and later ones
/// plateau at 30s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt
    retries: usize,
    /// Base delay; attempt `n` waits `retry_delay * 2^n`
    retry_delay: Duration,
    /// Upper bound for any single delay
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a new retry policy
    pub fn new(retries: usize) -> Self {
        Self {
            retries,
            retry_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Sets the base retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates the backoff after the failed attempt `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns the number of retries
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Returns the base retry delay
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Returns the maximum number of attempts (including the first attempt)
    pub fn max_attempts(&self) -> usize {
        self.retries + 1
    }

    /// Returns true if another attempt is allowed after `attempt` failed
    pub fn allows_retry_after(&self, attempt: usize) -> bool {
        attempt < self.retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Sleeps for `delay`, returning early with `Cancelled` if the token trips
pub async fn sleep_cancellable(
    delay: Duration,
    cancel: &CancellationToken,
) -> ResilienceResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResilienceError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, the
/// policy is exhausted, or `cancel` trips.
///
/// `operation` receives the 0-based attempt number. The cancellation token
/// is checked before each attempt and raced against every backoff sleep;
/// cancellation is reported through `E::from(ResilienceError::Cancelled)`.
pub async fn with_retry<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: From<ResilienceError> + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ResilienceError::Cancelled.into());
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if cancel.is_cancelled() || !policy.allows_retry_after(attempt) || !should_retry(&error) {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        log::warn!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            attempt + 1,
            policy.max_attempts(),
            error,
            delay
        );
        sleep_cancellable(delay, cancel).await?;
        attempt += 1;
    }
}
