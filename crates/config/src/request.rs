// crates/config/src/request.rs
//! Request execution section: timeouts, concurrency, retries

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// How requests are sent and retried
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RequestSection {
    /// Prefix for relative request paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Requests allowed on the wire at once; the rest wait in FIFO order
    pub max_concurrent: usize,

    /// Retries after the first attempt
    pub retries: usize,

    /// Base backoff in milliseconds, doubled per retry
    pub retry_delay_ms: u64,

    /// Upper bound on a single backoff; later retries wait exactly this long
    pub max_retry_delay_ms: u64,

    /// Share one execution between identical concurrent requests
    pub deduplicate: bool,

    pub user_agent: String,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
            max_concurrent: 6,
            retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            deduplicate: true,
            user_agent: format!("Courier/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConfigSection for RequestSection {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(self.timeout_ms, 100, 600_000, "request.timeout_ms"),
            Validator::in_range(self.max_concurrent, 1, 64, "request.max_concurrent"),
            Validator::in_range(self.retries, 0, 10, "request.retries"),
            Validator::in_range(self.retry_delay_ms, 0, 60_000, "request.retry_delay_ms"),
            Validator::in_range(
                self.max_retry_delay_ms,
                self.retry_delay_ms,
                600_000,
                "request.max_retry_delay_ms",
            ),
            Validator::not_empty(&self.user_agent, "request.user_agent"),
        ];
        if let Some(base_url) = &self.base_url {
            results.push(Validator::http_url(base_url, "request.base_url"));
        }
        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        self.timeout_ms = other.timeout_ms;
        self.max_concurrent = other.max_concurrent;
        self.retries = other.retries;
        self.retry_delay_ms = other.retry_delay_ms;
        self.max_retry_delay_ms = other.max_retry_delay_ms;
        self.deduplicate = other.deduplicate;
        self.user_agent = other.user_agent;
    }

    fn section_name(&self) -> &'static str {
        "request"
    }
}
