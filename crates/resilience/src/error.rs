// crates/resilience/src/error.rs
//! Error types for resilience operations

use thiserror::Error;

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Errors that can occur in resilience operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// A single attempt exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller's cancellation token was tripped
    #[error("Operation was cancelled")]
    Cancelled,
}

impl ResilienceError {
    /// Returns true if the error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let err = ResilienceError::Timeout(std::time::Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5s"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_error() {
        let err = ResilienceError::Cancelled;
        assert!(err.to_string().contains("cancelled"));
        assert!(err.is_cancelled());
    }
}
