//! Response construction helpers.
//!
//! # Responsibilities
//! - Structured JSON error bodies (status, message, timestamp, request id)
//! - Gzip compression of eligible response bodies
//!
//! # Design Decisions
//! - Clients never see internal error text or stack traces
//! - Compression requires: enabled, client accepts gzip, body over the
//!   threshold, content type on the configured list

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::config::schema::CompressionConfig;
use crate::error::ProxyError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
    timestamp: u64,
    request_id: &'a str,
}

/// Build the structured error response for a request-path failure.
pub fn error_response(error: &ProxyError, request_id: &str) -> Response<Body> {
    let status = error.status_code();
    let message = match error {
        ProxyError::RateLimited => "Too Many Requests".to_string(),
        ProxyError::NoHealthyBackend => "Service Unavailable".to_string(),
        ProxyError::Backend(_) | ProxyError::Timeout => "Bad Gateway".to_string(),
        ProxyError::Rejected { message, .. } => message.clone(),
    };
    structured_response(status, &message, request_id)
}

/// Structured JSON response with the given status and message.
pub fn structured_response(status: StatusCode, message: &str, request_id: &str) -> Response<Body> {
    let body = ErrorBody {
        status: status.as_u16(),
        message,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        request_id,
    };
    let json = serde_json::to_vec(&body).unwrap_or_else(|_| message.as_bytes().to_vec());

    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// True when the client advertises gzip support.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false)
}

/// True when this response body qualifies for compression.
pub fn should_compress(
    config: &CompressionConfig,
    body_len: usize,
    response_headers: &HeaderMap,
) -> bool {
    if !config.enabled || body_len < config.min_size_bytes {
        return false;
    }
    // Upstream already encoded it: leave it alone.
    if response_headers.contains_key(header::CONTENT_ENCODING) {
        return false;
    }
    let content_type = response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    config
        .content_types
        .iter()
        .any(|prefix| content_type.starts_with(prefix.as_str()))
}

/// Gzip a body, returning None if encoding fails (caller sends it raw).
pub fn gzip(body: &[u8]) -> Option<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).ok()?;
    encoder.finish().ok().map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_structured() {
        let response = error_response(&ProxyError::NoHealthyBackend, "req-42");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_accepts_gzip() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );
        assert!(accepts_gzip(&headers));
    }

    #[test]
    fn test_should_compress_rules() {
        let config = CompressionConfig {
            enabled: true,
            min_size_bytes: 10,
            content_types: vec!["text/".to_string()],
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html"),
        );

        assert!(should_compress(&config, 100, &headers));
        // Under threshold.
        assert!(!should_compress(&config, 5, &headers));

        // Wrong content type.
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("image/png"),
        );
        assert!(!should_compress(&config, 100, &headers));

        // Already encoded.
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html"),
        );
        headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static("br"),
        );
        assert!(!should_compress(&config, 100, &headers));
    }

    #[test]
    fn test_gzip_round_trip_shrinks_repetitive_body() {
        let body = vec![b'a'; 4096];
        let compressed = gzip(&body).unwrap();
        assert!(compressed.len() < body.len());
    }
}
