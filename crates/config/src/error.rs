// crates/config/src/error.rs
//! Error types for the configuration system

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot encode config as TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One or more fields hold values the client cannot run with
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Cannot create directory {path}: {source}")]
    DirectoryCreationError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No platform config directory (no home directory, usually)
    #[error("No config directory: {reason}")]
    PathResolutionError { reason: String },

    #[error("Cannot back up previous config: {source}")]
    BackupError { source: std::io::Error },

    #[error("Config I/O failed: {0}")]
    IoError(#[from] std::io::Error),
}

/// Validation error for a specific config field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the field, e.g. `request.timeout_ms`
    pub field: String,
    pub message: String,
    /// The rejected value, when it is worth echoing back
    pub value: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Same as [`new`](Self::new), echoing the rejected value
    pub fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::new(field, message)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field '{}': {}", self.field, self.message)?;
        match &self.value {
            Some(value) => write!(f, " (got: {})", value),
            None => Ok(()),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Joins section errors into the single message carried by `ConfigError`
pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
