// crates/network/src/classify.rs
//! Maps transport outcomes to classified errors
//!
//! Everything here is pure: no I/O, no shared state.

use crate::error::{ErrorKind, NetworkError};
use crate::transport::{FailureKind, TransportFailure, TransportResponse};

/// Lowercased fragments that identify a connectivity failure
const CONNECTIVITY_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "dns",
    "failed to lookup address",
    "name or service not known",
    "network is unreachable",
    "fetch failed",
    "error sending request",
    "offline",
];

/// Longest body excerpt kept in `NetworkError::raw`
const RAW_EXCERPT_LEN: usize = 512;

/// Classifies a failure that happened before any response arrived
pub fn classify_failure(failure: &TransportFailure) -> NetworkError {
    let kind = match failure.kind {
        FailureKind::Connect => ErrorKind::Network,
        FailureKind::Timeout => ErrorKind::Timeout,
        FailureKind::Aborted => ErrorKind::Cancelled,
        FailureKind::Tls => ErrorKind::Security,
        FailureKind::Other => {
            if matches_connectivity_signature(&failure.message) {
                ErrorKind::Network
            } else {
                ErrorKind::Unknown
            }
        }
    };

    NetworkError::new(kind, failure.message.clone()).with_raw(failure.message.clone())
}

/// Classifies a received response; `None` means it is a success
///
/// A 2xx body carrying an application failure envelope
/// (`{"success": false, ...}`) is a non-retryable `Server` error.
pub fn classify_response(response: &TransportResponse) -> Option<NetworkError> {
    let status = response.status;

    if response.is_success() {
        return envelope_failure(response)
            .map(|message| NetworkError::new(ErrorKind::Server, message).with_status(status));
    }

    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        500..=u16::MAX => ErrorKind::Server,
        400..=499 => ErrorKind::Client,
        _ => ErrorKind::Unknown,
    };

    let message = body_message(response).unwrap_or_else(|| status_message(status));
    let mut error = NetworkError::new(kind, message).with_status(status);
    if !response.body.is_empty() {
        error = error.with_raw(excerpt(&response.text()));
    }
    Some(error)
}

/// Classifies either side of a transport outcome
pub fn classify(outcome: &Result<TransportResponse, TransportFailure>) -> Option<NetworkError> {
    match outcome {
        Ok(response) => classify_response(response),
        Err(failure) => Some(classify_failure(failure)),
    }
}

fn matches_connectivity_signature(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONNECTIVITY_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

fn envelope_failure(response: &TransportResponse) -> Option<String> {
    let value: serde_json::Value = response.json_body().ok()?;
    if value.get("success")?.as_bool()? {
        return None;
    }
    Some(
        message_field(&value)
            .unwrap_or("request was rejected by the server")
            .to_string(),
    )
}

fn body_message(response: &TransportResponse) -> Option<String> {
    let value: serde_json::Value = response.json_body().ok()?;
    message_field(&value).map(str::to_string)
}

fn message_field(value: &serde_json::Value) -> Option<&str> {
    ["message", "msg", "error"]
        .iter()
        .find_map(|field| value.get(*field).and_then(|v| v.as_str()))
}

fn status_message(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("HTTP {}: {}", status, reason)
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(RAW_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_connect_failure_is_network() {
        let err = classify_failure(&TransportFailure::connect("tcp connect error"));
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.retryable);
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_signature_matching() {
        for message in [
            "Connection refused (os error 111)",
            "connection reset by peer",
            "dns error: failed to lookup address information",
            "TypeError: fetch failed",
        ] {
            let err = classify_failure(&TransportFailure::other(message));
            assert_eq!(err.kind, ErrorKind::Network, "{}", message);
        }

        let err = classify_failure(&TransportFailure::other("builder error"));
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
    }

    #[test]
    fn test_timeout_failure() {
        let err = classify_failure(&TransportFailure::timeout(Duration::from_secs(3)));
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
    }

    #[test]
    fn test_tls_and_abort() {
        let tls = classify_failure(&TransportFailure::new(FailureKind::Tls, "invalid certificate"));
        assert_eq!(tls.kind, ErrorKind::Security);
        assert!(!tls.retryable);

        let aborted = classify_failure(&TransportFailure::new(FailureKind::Aborted, "aborted"));
        assert_eq!(aborted.kind, ErrorKind::Cancelled);
        assert!(!aborted.retryable);
    }

    #[test]
    fn test_auth_statuses() {
        for status in [401, 403] {
            let err = classify_response(&TransportResponse::new(status, "")).expect("error");
            assert_eq!(err.kind, ErrorKind::Auth);
            assert!(!err.retryable);
            assert_eq!(err.status, Some(status));
        }
    }

    #[test]
    fn test_server_statuses_are_retryable() {
        for status in [500, 502, 503, 599] {
            let err = classify_response(&TransportResponse::new(status, "oops")).expect("error");
            assert_eq!(err.kind, ErrorKind::Server);
            assert!(err.retryable);
            assert_eq!(err.raw.as_deref(), Some("oops"));
        }
    }

    #[test]
    fn test_client_statuses() {
        let err = classify_response(&TransportResponse::json(
            422,
            &json!({"message": "name is required"}),
        ))
        .expect("error");
        assert_eq!(err.kind, ErrorKind::Client);
        assert_eq!(err.message, "name is required");
        assert!(!err.retryable);

        let err = classify_response(&TransportResponse::new(404, "")).expect("error");
        assert_eq!(err.message, "HTTP 404: Not Found");
    }

    #[test]
    fn test_unexpected_status_is_unknown() {
        let err = classify_response(&TransportResponse::new(304, "")).expect("error");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
    }

    #[test]
    fn test_success_passes() {
        assert!(classify_response(&TransportResponse::new(200, "plain text")).is_none());
        assert!(classify_response(&TransportResponse::json(
            201,
            &json!({"success": true, "data": 1})
        ))
        .is_none());
    }

    #[test]
    fn test_failure_envelope() {
        let response =
            TransportResponse::json(200, &json!({"success": false, "message": "quota exceeded"}));
        let err = classify_response(&response).expect("envelope failure");
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.message, "quota exceeded");
        assert_eq!(err.status, Some(200));
        assert!(!err.retryable);
    }

    #[test]
    fn test_classify_outcome() {
        let ok: Result<TransportResponse, TransportFailure> = Ok(TransportResponse::new(204, ""));
        assert!(classify(&ok).is_none());

        let failed: Result<TransportResponse, TransportFailure> =
            Err(TransportFailure::connect("refused"));
        assert_eq!(classify(&failed).map(|e| e.kind), Some(ErrorKind::Network));
    }

    #[test]
    fn test_raw_excerpt_is_bounded() {
        let body = "x".repeat(RAW_EXCERPT_LEN * 2);
        let err = classify_response(&TransportResponse::new(500, body)).expect("error");
        let raw = err.raw.expect("raw");
        assert_eq!(raw.len(), RAW_EXCERPT_LEN + 3);
    }
}
