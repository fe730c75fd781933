// crates/network/src/coordinator.rs
//! Deduplicating, bounded-concurrency request execution
//!
//! Every request passes through [`RequestCoordinator::execute`], which in
//! order:
//!
//! 1. answers cacheable requests from the [`ResponseCache`] when it can,
//! 2. joins an identical request that is already in flight,
//! 3. waits for one of `max_concurrent` execution slots (FIFO),
//! 4. runs the attempt loop with exponential backoff, classifying each
//!    outcome, and
//! 5. stores successful cacheable responses.

use crate::cache::ResponseCache;
use crate::classify::{classify_failure, classify_response};
use crate::connectivity::ConnectivityMonitor;
use crate::descriptor::RequestDescriptor;
use crate::error::{ErrorKind, NetworkError, NetworkResult};
use crate::transport::{Transport, TransportResponse};
use courier_resilience::{with_retry, with_timeout};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

type SharedResponse = Shared<BoxFuture<'static, NetworkResult<TransportResponse>>>;

/// Snapshot of the coordinator's load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    /// Distinct deduplicated requests currently registered
    pub pending_requests: usize,
    /// Requests waiting for an execution slot
    pub queue_length: usize,
    /// Requests holding an execution slot
    pub running_count: usize,
    pub max_concurrent: usize,
}

struct Inner {
    transport: Arc<dyn Transport>,
    cache: ResponseCache,
    connectivity: ConnectivityMonitor,
    slots: Semaphore,
    max_concurrent: usize,
    in_flight: Mutex<HashMap<String, SharedResponse>>,
    queued: AtomicUsize,
    running: AtomicUsize,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, SharedResponse>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Increments a gauge for as long as it is alive
struct Gauge<'a>(&'a AtomicUsize);

impl<'a> Gauge<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Gauge<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executes [`RequestDescriptor`]s against a [`Transport`]
///
/// Cloning is cheap; clones share the cache, the in-flight table and the
/// concurrency budget.
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<Inner>,
}

impl RequestCoordinator {
    /// Creates a coordinator; a `max_concurrent` of zero is raised to one
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: ResponseCache,
        connectivity: ConnectivityMonitor,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = if max_concurrent == 0 {
            log::warn!("max_concurrent of 0 is not usable, using 1");
            1
        } else {
            max_concurrent
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                cache,
                connectivity,
                slots: Semaphore::new(max_concurrent),
                max_concurrent,
                in_flight: Mutex::new(HashMap::new()),
                queued: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    /// Runs a request to a terminal outcome
    ///
    /// Errors are always classified; a successful return is a response
    /// with a 2xx status and no failure envelope.
    pub async fn execute(&self, descriptor: RequestDescriptor) -> NetworkResult<TransportResponse> {
        if descriptor.is_cacheable() {
            if let Some(hit) = self.inner.cache.get(&descriptor.cache_key()) {
                log::debug!("Cache hit: {}", descriptor.cache_key());
                return Ok(hit);
            }
        }

        if !descriptor.deduplicate() {
            return Self::run(Arc::clone(&self.inner), descriptor).await;
        }

        let shared = {
            let mut in_flight = self.inner.in_flight();
            match in_flight.get(descriptor.dedupe_key()) {
                Some(existing) => {
                    log::debug!("Joining in-flight request: {}", descriptor.dedupe_key());
                    existing.clone()
                }
                None => {
                    let key = descriptor.dedupe_key().to_string();
                    let shared = self.spawn_registered(descriptor);
                    in_flight.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Spawns the execution so that it settles, and unregisters itself,
    /// even if every caller stops waiting
    fn spawn_registered(&self, descriptor: RequestDescriptor) -> SharedResponse {
        let inner = Arc::clone(&self.inner);
        let key = descriptor.dedupe_key().to_string();

        let handle = tokio::spawn(async move {
            let result = Self::run(Arc::clone(&inner), descriptor).await;
            inner.in_flight().remove(&key);
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(NetworkError::new(
                    ErrorKind::Unknown,
                    format!("request task failed: {}", e),
                ))
            })
        }
        .boxed()
        .shared()
    }

    async fn run(
        inner: Arc<Inner>,
        descriptor: RequestDescriptor,
    ) -> NetworkResult<TransportResponse> {
        let cancel = descriptor.cancel_token().clone();

        let permit = {
            let _queued = Gauge::enter(&inner.queued);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NetworkError::cancelled()),
                permit = inner.slots.acquire() => permit.map_err(|_| {
                    NetworkError::new(ErrorKind::Unknown, "request queue is closed")
                })?,
            }
        };
        let _running = Gauge::enter(&inner.running);

        let retry = descriptor.retry();
        let inner_ref: &Inner = &inner;
        let descriptor_ref = &descriptor;
        let result = with_retry(
            &retry.policy,
            &cancel,
            move |attempt| Self::attempt(inner_ref, descriptor_ref, attempt),
            |error: &NetworkError| retry.should_retry(error),
        )
        .await;
        drop(permit);

        match &result {
            Ok(response) => {
                if descriptor.is_cacheable() {
                    inner
                        .cache
                        .set(descriptor.cache_key(), response.clone(), descriptor.cache_ttl());
                }
            }
            Err(error) if error.is_cancelled() => {
                log::debug!("{} {} cancelled", descriptor.verb(), descriptor.url());
            }
            Err(error) => {
                log::warn!("{} {} failed: {}", descriptor.verb(), descriptor.url(), error);
            }
        }

        result
    }

    async fn attempt(
        inner: &Inner,
        descriptor: &RequestDescriptor,
        attempt: usize,
    ) -> NetworkResult<TransportResponse> {
        if !inner.connectivity.is_online() {
            return Err(NetworkError::new(ErrorKind::Network, "network is offline"));
        }

        log::debug!(
            "{} {} (attempt {})",
            descriptor.verb(),
            descriptor.url(),
            attempt + 1
        );

        let request = descriptor.to_transport_request();
        let outcome = tokio::select! {
            biased;
            _ = descriptor.cancel_token().cancelled() => return Err(NetworkError::cancelled()),
            outcome = with_timeout(descriptor.timeout(), inner.transport.send(request)) => outcome?,
        };

        match outcome {
            Ok(response) => match classify_response(&response) {
                Some(error) => Err(error),
                None => Ok(response),
            },
            Err(failure) => Err(classify_failure(&failure)),
        }
    }

    pub fn stats(&self) -> RequestStats {
        RequestStats {
            pending_requests: self.inner.in_flight().len(),
            queue_length: self.inner.queued.load(Ordering::SeqCst),
            running_count: self.inner.running.load(Ordering::SeqCst),
            max_concurrent: self.inner.max_concurrent,
        }
    }
}
