// crates/config/src/cache.rs
//! Response cache section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSection {
    /// GET requests are cached unless a request opts out
    pub enabled: bool,

    /// Entries kept before the oldest is evicted
    pub max_size: usize,

    /// Lifetime of an entry when the request gives none
    pub default_ttl_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            default_ttl_ms: 5 * 60 * 1_000,
        }
    }
}

impl ConfigSection for CacheSection {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::collect_errors(vec![
            Validator::in_range(self.max_size, 1, 100_000, "cache.max_size"),
            Validator::in_range(self.default_ttl_ms, 1, 86_400_000, "cache.default_ttl_ms"),
        ])
    }

    fn merge(&mut self, other: Self) {
        self.enabled = other.enabled;
        self.max_size = other.max_size;
        self.default_ttl_ms = other.default_ttl_ms;
    }

    fn section_name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CacheSection::default().validate().is_ok());
    }

    #[test]
    fn test_empty_cache_rejected() {
        let config = CacheSection {
            max_size: 0,
            default_ttl_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }

    #[test]
    fn test_disabled_cache_still_validated() {
        let config = CacheSection {
            enabled: false,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
