// crates/network/src/client.rs
//! Verb-level HTTP client over the request coordinator

use crate::cache::{CacheConfig, CacheStats, ResponseCache};
use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::{RequestCoordinator, RequestStats};
use crate::descriptor::{apply_query, resolve_url, RequestDescriptor, RetryOptions};
use crate::error::{ErrorKind, NetworkError, NetworkResult};
use crate::reqwest_transport::ReqwestTransport;
use crate::transport::{RequestBody, Transport, TransportResponse, Verb};
use courier_resilience::{CancellationToken, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request urls
    pub base_url: Option<String>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Simultaneous transport calls
    pub max_concurrent: usize,
    /// Retry policy used when a request does not bring its own
    pub retry_policy: RetryPolicy,
    /// Default for collapsing identical concurrent requests
    pub deduplicate: bool,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("Courier/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            max_concurrent: 6,
            retry_policy: RetryPolicy::default(),
            deduplicate: true,
            default_headers: BTreeMap::new(),
            cache: CacheConfig::default(),
        }
    }
}

/// Per-request overrides; unset fields fall back to [`ClientConfig`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub enable_cache: Option<bool>,
    pub cache_ttl: Option<Duration>,
    pub retry: Option<RetryOptions>,
    pub deduplicate: Option<bool>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.enable_cache = Some(enable);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = Some(deduplicate);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// HTTP client with deduplication, caching, bounded concurrency and retry
///
/// Construct one per application and hand out clones; they share the
/// cache and the concurrency budget.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<ClientConfig>,
    coordinator: RequestCoordinator,
}

impl HttpClient {
    /// Creates a client backed by reqwest
    pub fn new(config: ClientConfig) -> NetworkResult<Self> {
        let transport =
            ReqwestTransport::new(&config.user_agent, config.max_redirects, config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over any transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let coordinator = RequestCoordinator::new(
            transport,
            ResponseCache::from_config(&config.cache),
            ConnectivityMonitor::new(),
            config.max_concurrent,
        );

        Self {
            config: Arc::new(config),
            coordinator,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Get, url, params, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Post, url, data, options).await
    }

    pub async fn put(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Put, url, data, options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Patch, url, data, options).await
    }

    pub async fn delete(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Delete, url, params, options).await
    }

    pub async fn head(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        self.request(Verb::Head, url, params, options).await
    }

    /// GET and decode the body as JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<T> {
        let response = self.get(url, params, options).await?;
        decode(&response)
    }

    /// POST and decode the body as JSON
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<T> {
        let response = self.post(url, data, options).await?;
        decode(&response)
    }

    /// Issues `verb` with `data` as the query (GET, HEAD, DELETE) or as a
    /// JSON body (everything else)
    pub async fn request(
        &self,
        verb: Verb,
        url: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        let mut resolved = resolve_url(self.config.base_url.as_deref(), url)?;

        let body = match data {
            Some(params) if verb.uses_query() => {
                apply_query(&mut resolved, &params)?;
                RequestBody::Empty
            }
            Some(value) => RequestBody::Json(value),
            None => RequestBody::Empty,
        };

        self.send_resolved(verb, resolved.to_string(), body, options).await
    }

    /// Sends an arbitrary body, multipart included
    pub async fn send(
        &self,
        verb: Verb,
        url: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        let resolved = resolve_url(self.config.base_url.as_deref(), url)?;
        self.send_resolved(verb, resolved.to_string(), body, options).await
    }

    async fn send_resolved(
        &self,
        verb: Verb,
        url: String,
        body: RequestBody,
        options: RequestOptions,
    ) -> NetworkResult<TransportResponse> {
        let descriptor = self.describe(verb, url, body, options);
        self.coordinator.execute(descriptor).await
    }

    fn describe(
        &self,
        verb: Verb,
        url: String,
        body: RequestBody,
        options: RequestOptions,
    ) -> RequestDescriptor {
        let config = &self.config;
        let mut builder = RequestDescriptor::builder(verb, url)
            .body(body)
            .headers(config.default_headers.clone())
            .headers(options.headers)
            .cacheable(options.enable_cache.unwrap_or(config.cache.enabled))
            .cache_ttl(options.cache_ttl)
            .deduplicate(options.deduplicate.unwrap_or(config.deduplicate))
            .retry(
                options
                    .retry
                    .unwrap_or_else(|| RetryOptions::new(config.retry_policy.clone())),
            )
            .timeout(options.timeout.unwrap_or(config.timeout));

        if let Some(cancel) = options.cancel {
            builder = builder.cancel_token(cancel);
        }
        builder.build()
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.coordinator.cache().stats()
    }

    pub fn get_request_stats(&self) -> RequestStats {
        self.coordinator.stats()
    }

    pub fn clear_cache(&self) {
        self.coordinator.cache().clear();
    }

    /// Drops cached GET responses whose url starts with `url_prefix`
    ///
    /// Relative prefixes are resolved against the base url.
    pub fn invalidate_cache(&self, url_prefix: &str) -> usize {
        let prefix = match resolve_url(self.config.base_url.as_deref(), url_prefix) {
            Ok(url) => url.to_string(),
            Err(_) => url_prefix.to_string(),
        };
        let removed = self
            .coordinator
            .cache()
            .invalidate_prefix(&format!("{} {}", Verb::Get, prefix));
        log::debug!("Invalidated {} cache entries under {}", removed, prefix);
        removed
    }

    /// Reachability signal consulted before every attempt
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        self.coordinator.connectivity()
    }

    /// Probes the connectivity check urls through this client's transport
    pub async fn probe_connectivity(&self) -> bool {
        let transport = self.coordinator.transport();
        self.connectivity().probe(transport.as_ref()).await
    }
}

fn decode<T: DeserializeOwned>(response: &TransportResponse) -> NetworkResult<T> {
    response.json_body().map_err(|e| {
        NetworkError::new(ErrorKind::Unknown, format!("Failed to decode response body: {}", e))
            .with_status(response.status)
    })
}
