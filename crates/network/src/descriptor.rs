// crates/network/src/descriptor.rs
//! Immutable description of one logical request

use crate::error::{ErrorKind, NetworkError, NetworkResult};
use crate::transport::{RequestBody, TransportRequest, Verb};
use courier_resilience::{CancellationToken, RetryPolicy};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied veto over retrying a retryable error
pub type RetryCondition = Arc<dyn Fn(&NetworkError) -> bool + Send + Sync>;

/// Retry settings for a single request
#[derive(Clone, Default)]
pub struct RetryOptions {
    pub policy: RetryPolicy,
    pub condition: Option<RetryCondition>,
}

impl RetryOptions {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            condition: None,
        }
    }

    /// Only retry errors for which `condition` returns true
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&NetworkError) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Retryable by classification and not vetoed by the condition
    pub fn should_retry(&self, error: &NetworkError) -> bool {
        error.is_retryable() && self.condition.as_ref().map_or(true, |allow| allow(error))
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("policy", &self.policy)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A fully resolved request
///
/// Built once by the client and never mutated afterwards. The dedup key
/// and cache key are derived at construction.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    verb: Verb,
    url: String,
    body: RequestBody,
    headers: BTreeMap<String, String>,
    cacheable: bool,
    cache_ttl: Option<Duration>,
    deduplicate: bool,
    dedupe_key: String,
    retry: RetryOptions,
    timeout: Duration,
    cancel: CancellationToken,
}

impl RequestDescriptor {
    /// Starts a descriptor for an absolute url
    pub fn builder(verb: Verb, url: impl Into<String>) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder {
            verb,
            url: url.into(),
            body: RequestBody::Empty,
            headers: BTreeMap::new(),
            cacheable: verb.is_cacheable(),
            cache_ttl: None,
            deduplicate: true,
            retry: RetryOptions::default(),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Whether this request reads and populates the response cache
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    pub fn deduplicate(&self) -> bool {
        self.deduplicate
    }

    /// `VERB url` plus the canonical body rendering
    pub fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    /// Cache key; same as the dedupe key, so a GET that carries a body
    /// never shares an entry with one carrying a different body. Bodiless
    /// requests key as `VERB url`, which prefix invalidation relies on.
    pub fn cache_key(&self) -> String {
        self.dedupe_key.clone()
    }

    pub fn retry(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Builds the transport request for one attempt
    pub fn to_transport_request(&self) -> TransportRequest {
        TransportRequest {
            verb: self.verb,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
        }
    }
}

/// Builder for [`RequestDescriptor`]
#[derive(Debug)]
pub struct RequestDescriptorBuilder {
    verb: Verb,
    url: String,
    body: RequestBody,
    headers: BTreeMap<String, String>,
    cacheable: bool,
    cache_ttl: Option<Duration>,
    deduplicate: bool,
    retry: RetryOptions,
    timeout: Duration,
    cancel: CancellationToken,
}

impl RequestDescriptorBuilder {
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Requests cache use; ignored for verbs other than GET
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable && self.verb.is_cacheable();
        self
    }

    pub fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> RequestDescriptor {
        let body_key = self.body.fingerprint();
        let dedupe_key = if body_key.is_empty() {
            format!("{} {}", self.verb, self.url)
        } else {
            format!("{} {} {}", self.verb, self.url, body_key)
        };

        RequestDescriptor {
            verb: self.verb,
            url: self.url,
            body: self.body,
            headers: self.headers,
            cacheable: self.cacheable,
            cache_ttl: self.cache_ttl,
            deduplicate: self.deduplicate,
            dedupe_key,
            retry: self.retry,
            timeout: self.timeout,
            cancel: self.cancel,
        }
    }
}

/// Joins a relative path onto `base_url`; absolute urls pass through
pub fn resolve_url(base_url: Option<&str>, path: &str) -> NetworkResult<reqwest::Url> {
    let joined = match base_url {
        Some(base) if !path.starts_with("http://") && !path.starts_with("https://") => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        _ => path.to_string(),
    };

    reqwest::Url::parse(&joined).map_err(|e| {
        NetworkError::new(ErrorKind::Client, format!("Invalid URL '{}': {}", joined, e))
    })
}

/// Appends `params` to the url's query in sorted key order
///
/// Existing query pairs are merged in, so `/items?page=1` and
/// `/items` + `{"page": 1}` produce the same url. A key in `params`
/// replaces every existing pair with that key. Arrays repeat the key once
/// per element (`{"tag": ["a", "b"]}` becomes `tag=a&tag=b`), keeping
/// element order.
pub fn apply_query(url: &mut reqwest::Url, params: &serde_json::Value) -> NetworkResult<()> {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    match params {
        serde_json::Value::Null => {}
        serde_json::Value::Object(map) => {
            pairs.retain(|(key, _)| !map.contains_key(key));
            for (key, value) in map {
                match value {
                    serde_json::Value::Array(items) => {
                        for item in items {
                            if let Some(rendered) = query_value(item) {
                                pairs.push((key.clone(), rendered));
                            }
                        }
                    }
                    other => {
                        if let Some(rendered) = query_value(other) {
                            pairs.push((key.clone(), rendered));
                        }
                    }
                }
            }
        }
        other => {
            return Err(NetworkError::new(
                ErrorKind::Client,
                format!("Query parameters must be an object, got {}", other),
            ))
        }
    }

    // Stable, so repeated keys keep their element order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }
    Ok(())
}

fn query_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
