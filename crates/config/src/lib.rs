// crates/config/src/lib.rs
//! Courier configuration
//!
//! A single TOML file with one table per concern:
//!
//! ```toml
//! version = 1
//!
//! [request]
//! base_url = "https://api.example.com"
//! timeout_ms = 30000
//! max_concurrent = 6
//!
//! [cache]
//! default_ttl_ms = 300000
//!
//! [upload]
//! chunk_size = 2097152
//! ```
//!
//! Each table is a type implementing [`ConfigSection`]. Missing tables and
//! fields take their defaults, and saves are atomic.
//!
//! # Example
//!
//! ```rust,no_run
//! use courier_config::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new().expect("config directory");
//! let config = manager.load().unwrap_or_else(|e| {
//!     eprintln!("Config error: {}, using defaults", e);
//!     Config::default()
//! });
//! println!("Concurrency: {}", config.request.max_concurrent);
//! ```

mod cache;
mod error;
mod manager;
mod persistence;
mod request;
mod upload;
mod validation;

pub use cache::CacheSection;
pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::{apply_overrides, ConfigManager, ENV_PREFIX};
pub use request::RequestSection;
pub use upload::UploadSection;
pub use validation::{ConfigSection, Validator};

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub request: RequestSection,
    pub cache: CacheSection,
    pub upload: UploadSection,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section, returning all errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.request.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.cache.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.upload.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges `other` into this config, preferring its values
    pub fn merge(&mut self, other: Config) {
        self.request.merge(other.request);
        self.cache.merge(other.cache);
        self.upload.merge(other.upload);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            request: RequestSection::default(),
            cache: CacheSection::default(),
            upload: UploadSection::default(),
        }
    }
}
