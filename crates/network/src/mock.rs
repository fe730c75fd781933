// crates/network/src/mock.rs
//! Scripted in-memory transport for tests and demos

use crate::transport::{
    RequestBody, Transport, TransportFailure, TransportRequest, TransportResponse, Verb,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What the mock answers for one call
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(TransportResponse),
    Failure(TransportFailure),
}

/// One recorded transport call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub verb: Verb,
    pub url: String,
    pub body: RequestBody,
}

impl RecordedCall {
    /// Value of a text field in a multipart body
    pub fn form_field(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Multipart(fields) => fields.iter().find_map(|field| match field {
                crate::transport::MultipartField::Text { name: n, value } if n == name => {
                    Some(value.as_str())
                }
                _ => None,
            }),
            _ => None,
        }
    }
}

type Handler = Box<dyn Fn(&TransportRequest) -> MockReply + Send + Sync>;

/// A [`Transport`] answering from a closure
///
/// Every call is recorded, and the number of simultaneously active calls
/// is tracked so tests can assert on concurrency bounds.
pub struct MockTransport {
    handler: Handler,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Answers every call with `200` and the given JSON body
    pub fn ok_json(value: serde_json::Value) -> Self {
        Self::new(move |_| MockReply::Response(TransportResponse::json(200, &value)))
    }

    /// Holds each call open for `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Calls whose url contains `fragment`
    pub fn calls_to(&self, fragment: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.url.contains(fragment))
            .collect()
    }

    /// Highest number of calls that were in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFailure> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                verb: request.verb,
                url: request.url.clone(),
                body: request.body.clone(),
            });

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match (self.handler)(&request) {
            MockReply::Response(response) => Ok(response),
            MockReply::Failure(failure) => Err(failure),
        }
    }
}
