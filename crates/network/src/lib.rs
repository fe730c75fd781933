// crates/network/src/lib.rs
//! HTTP client execution core
//!
//! Application code talks to [`HttpClient`] (the verb surface) and
//! [`UploadManager`] (chunked, resumable uploads). Underneath, every
//! request is described by a [`RequestDescriptor`] and executed by the
//! [`RequestCoordinator`], which deduplicates identical in-flight
//! requests, bounds concurrency, retries transient failures with
//! exponential backoff and caches successful GET responses.
//!
//! ```no_run
//! use courier_network::{ClientConfig, HttpClient, RequestOptions};
//!
//! # async fn demo() -> Result<(), courier_network::NetworkError> {
//! let client = HttpClient::new(ClientConfig {
//!     base_url: Some("https://api.example.com".to_string()),
//!     ..ClientConfig::default()
//! })?;
//! let items: serde_json::Value = client
//!     .get_json("/items", Some(serde_json::json!({"page": 1})), RequestOptions::new())
//!     .await?;
//! # let _ = items;
//! # Ok(())
//! # }
//! ```

mod cache;
mod classify;
mod client;
mod connectivity;
mod coordinator;
mod descriptor;
mod error;
mod reqwest_transport;
mod transport;
pub mod upload;

/// Scripted transport; enable the `test-support` feature to use it outside
/// this crate's own tests
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use cache::{CacheConfig, CacheStats, ResponseCache};
pub use classify::{classify, classify_failure, classify_response};
pub use client::{ClientConfig, HttpClient, RequestOptions};
pub use connectivity::ConnectivityMonitor;
pub use coordinator::{RequestCoordinator, RequestStats};
pub use descriptor::{
    apply_query, resolve_url, RequestDescriptor, RequestDescriptorBuilder, RetryCondition,
    RetryOptions,
};
pub use error::{ErrorKind, NetworkError, NetworkResult, UploadError, UploadResult};
pub use reqwest_transport::ReqwestTransport;
pub use transport::{
    FailureKind, MultipartField, RequestBody, Transport, TransportFailure, TransportRequest,
    TransportResponse, Verb,
};
pub use upload::{
    AddTaskOptions, ChunkInfo, TaskId, TaskSnapshot, TaskStatus, UploadConfig, UploadEvent,
    UploadFile, UploadManager,
};

pub use courier_resilience::{CancellationToken, RetryPolicy};
