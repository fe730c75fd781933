// crates/resilience/src/timeout.rs
//! Timeout handling utilities

use crate::error::{ResilienceError, ResilienceResult};
use std::future::Future;
use std::time::Duration;

/// Awaits `operation`, failing with `Timeout` if it does not finish in time
pub async fn with_timeout<F>(duration: Duration, operation: F) -> ResilienceResult<F::Output>
where
    F: Future,
{
    tokio::time::timeout(duration, operation)
        .await
        .map_err(|_| ResilienceError::Timeout(duration))
}

/// Per-attempt deadline wrapper
///
/// Each call to [`Timeout::execute`] starts a fresh deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Creates a new timeout
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Gets the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Executes an operation with this timeout
    pub async fn execute<F>(&self, operation: F) -> ResilienceResult<F::Output>
    where
        F: Future,
    {
        with_timeout(self.duration, operation).await
    }
}
