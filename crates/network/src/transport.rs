// crates/network/src/transport.rs
//! Transport abstraction the request core runs on

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// HTTP verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
        }
    }

    /// Only GET results may be served from or stored in the response cache
    pub fn is_cacheable(self) -> bool {
        matches!(self, Verb::Get)
    }

    /// Verbs whose data argument is sent as query parameters
    pub fn uses_query(self) -> bool {
        matches!(self, Verb::Get | Verb::Head | Verb::Delete)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multipart form
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        data: Bytes,
    },
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl ToString) -> Self {
        MultipartField::Text {
            name: name.into(),
            value: value.to_string(),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, data: Bytes) -> Self {
        MultipartField::File {
            name: name.into(),
            file_name: file_name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MultipartField::Text { name, .. } | MultipartField::File { name, .. } => name,
        }
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

impl RequestBody {
    /// Deterministic rendering used for dedup and cache keys
    ///
    /// JSON objects are rendered with recursively sorted keys, whatever
    /// order the map preserves. File parts contribute the SHA-256 of their
    /// bytes, so equal-sized uploads with different contents never share a key.
    pub fn fingerprint(&self) -> String {
        match self {
            RequestBody::Empty => String::new(),
            RequestBody::Json(value) => {
                let mut out = String::new();
                write_canonical(value, &mut out);
                out
            }
            RequestBody::Multipart(fields) => fields
                .iter()
                .map(|field| match field {
                    MultipartField::Text { name, value } => format!("{}={}", name, value),
                    MultipartField::File {
                        name,
                        file_name,
                        data,
                    } => format!(
                        "{}=@{}:{}",
                        name,
                        file_name,
                        hex::encode(Sha256::digest(data))
                    ),
                })
                .collect::<Vec<_>>()
                .join("&"),
        }
    }
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// A single attempt handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub verb: Verb,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Deadline for this attempt only
    pub timeout: Duration,
}

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are lowercased
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Builds a response with a JSON body
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON
    pub fn json_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Why a transport call produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, reset, DNS failure
    Connect,
    /// The attempt deadline elapsed
    Timeout,
    /// The call was aborted by the caller
    Aborted,
    /// TLS handshake or certificate problem
    Tls,
    /// Anything else; classified by message signature
    Other,
}

/// A transport-layer failure before any response was received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Connect, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(FailureKind::Timeout, format!("request timed out after {:?}", after))
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }
}

/// The capability the request core depends on
///
/// Implementations perform exactly one network exchange per call and must
/// not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFailure>;
}
