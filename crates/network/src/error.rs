// crates/network/src/error.rs
//! Error types for network operations

use crate::upload::{TaskId, TaskStatus};
use courier_resilience::ResilienceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Result type for upload management operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Stable failure category surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Connectivity failure before any response arrived
    Network,
    /// An attempt exceeded its deadline
    Timeout,
    /// 401/403; the session must be refreshed out-of-band
    Auth,
    /// 5xx, or an application-level failure envelope
    Server,
    /// 4xx other than 401/403
    Client,
    /// TLS or certificate failure
    Security,
    /// The caller's cancellation token was tripped
    Cancelled,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Kinds that are retryable regardless of status
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Security => "security",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request failure
///
/// `retryable` always equals `kind.is_transient() || status is 5xx`; the
/// constructors keep it in sync so it is never set by hand.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct NetworkError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Raw transport message or (truncated) response body
    pub raw: Option<String>,
    pub retryable: bool,
}

impl NetworkError {
    /// Creates an error without an HTTP status
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            raw: None,
            retryable: Self::compute_retryable(kind, None),
        }
    }

    /// Attaches the HTTP status of the response that caused the error
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self.retryable = Self::compute_retryable(self.kind, self.status);
        self
    }

    /// Attaches the raw payload
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Shorthand for a cancellation error
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request was cancelled")
    }

    fn compute_retryable(kind: ErrorKind, status: Option<u16>) -> bool {
        kind.is_transient() || matches!(status, Some(s) if (500..600).contains(&s))
    }

    /// Returns true if the error is retryable
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Returns true if the caller must re-authenticate
    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    /// Returns true if the request was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Returns true if the error is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(s) if (400..500).contains(&s))
    }

    /// Returns true if the error is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(s) if (500..600).contains(&s))
    }
}

impl From<ResilienceError> for NetworkError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::Timeout(after) => NetworkError::new(
                ErrorKind::Timeout,
                format!("request timed out after {:?}", after),
            ),
            ResilienceError::Cancelled => NetworkError::cancelled(),
        }
    }
}

/// Errors returned by the upload manager's management operations
#[derive(Debug, Error)]
pub enum UploadError {
    /// Chunk size or concurrency of zero
    #[error("Invalid upload option: {0}")]
    InvalidOption(String),

    /// No task with that id
    #[error("Upload task not found: {0}")]
    TaskNotFound(TaskId),

    /// The requested operation is not valid in the task's current state
    #[error("Cannot {action} task {id} in state {status}")]
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        action: &'static str,
    },

    /// Reading the file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A chunk, probe or merge request failed terminally
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Task processing needs a Tokio runtime to spawn on
    #[error("No Tokio runtime available to process uploads")]
    NoRuntime,
}

impl UploadError {
    /// Returns true if the underlying request was cancelled by pause or cancel
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Network(e) if e.is_cancelled())
    }
}
