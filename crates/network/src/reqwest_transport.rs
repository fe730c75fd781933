// crates/network/src/reqwest_transport.rs
//! Production transport backed by reqwest

use crate::error::{ErrorKind, NetworkError, NetworkResult};
use crate::transport::{
    FailureKind, MultipartField, RequestBody, Transport, TransportFailure, TransportRequest,
    TransportResponse, Verb,
};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method};
use std::collections::BTreeMap;
use std::time::Duration;

/// [`Transport`] implementation over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: ReqwestClient,
}

impl ReqwestTransport {
    /// Builds the underlying client
    ///
    /// `connect_timeout` bounds connection setup; the per-attempt deadline
    /// comes with each request.
    pub fn new(
        user_agent: &str,
        max_redirects: usize,
        connect_timeout: Duration,
    ) -> NetworkResult<Self> {
        let inner = ReqwestClient::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                NetworkError::new(ErrorKind::Unknown, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { inner })
    }

    fn method(verb: Verb) -> Method {
        match verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
            Verb::Head => Method::HEAD,
        }
    }

    fn form(fields: Vec<MultipartField>) -> reqwest::multipart::Form {
        fields
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, field| match field {
                MultipartField::Text { name, value } => form.text(name, value),
                MultipartField::File {
                    name,
                    file_name,
                    data,
                } => form.part(
                    name,
                    reqwest::multipart::Part::stream(data).file_name(file_name),
                ),
            })
    }

    fn failure(error: reqwest::Error) -> TransportFailure {
        let message = error.to_string();
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else if error.is_connect() {
            let lower = format!("{:?}", error).to_lowercase();
            if lower.contains("certificate") || lower.contains("tls") {
                FailureKind::Tls
            } else {
                FailureKind::Connect
            }
        } else {
            FailureKind::Other
        };
        TransportFailure::new(kind, message)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFailure> {
        let mut builder = self
            .inner
            .request(Self::method(request.verb), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(fields) => builder.multipart(Self::form(fields)),
        };

        let response = builder.send().await.map_err(Self::failure)?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(Self::failure)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
