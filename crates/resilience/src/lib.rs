// crates/resilience/src/lib.rs
//! Resilience patterns for fault-tolerant network calls
//!
//! This module provides:
//! - Retry with exponential backoff (`delay * 2^attempt`)
//! - Cancellation-aware backoff sleeps
//! - Per-attempt timeouts
//!
//! # Example
//!
//! ```rust
//! use courier_resilience::{RetryPolicy, Timeout};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3).with_retry_delay(Duration::from_millis(100));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
//!
//! let timeout = Timeout::new(Duration::from_secs(30));
//! assert_eq!(timeout.duration(), Duration::from_secs(30));
//! ```

mod error;
mod retry;
mod timeout;

pub use error::{ResilienceError, ResilienceResult};
pub use retry::{sleep_cancellable, with_retry, RetryPolicy};
pub use timeout::{with_timeout, Timeout};
pub use tokio_util::sync::CancellationToken;
