//! Per-request context.
//!
//! # Responsibilities
//! - Carry request identity and routing state through the pipeline
//! - Extract the session id and rate-limit key from the request
//!
//! # Design Decisions
//! - Created at ingress, dropped at response completion; never shared
//!   across requests, never persisted
//! - The request id comes from the ingress layer (uuid v4) so logs,
//!   forwarded headers, and error bodies all agree

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::http::{HeaderMap, Method};

use crate::config::schema::{RateLimitConfig, RateLimitKey};

/// State accumulated while one request moves through the dispatcher.
#[derive(Debug)]
pub struct RequestContext {
    pub id: String,
    pub started: Instant,
    pub client_ip: IpAddr,
    pub method: Method,
    pub path: String,
    pub session_id: Option<String>,
    pub selected_backend: Option<String>,
    pub retry_count: u32,
    pub cache_hit: bool,
    pub compressed: bool,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        client_addr: SocketAddr,
        method: Method,
        path: String,
        session_header: Option<&str>,
        headers: &HeaderMap,
    ) -> Self {
        let session_id = session_header
            .and_then(|name| headers.get(name))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Self {
            id: request_id,
            started: Instant::now(),
            client_ip: client_addr.ip(),
            method,
            path,
            session_id,
            selected_backend: None,
            retry_count: 0,
            cache_hit: false,
            compressed: false,
        }
    }

    /// Rate-limit key per the configured source.
    pub fn rate_limit_key(&self, config: &RateLimitConfig, headers: &HeaderMap) -> String {
        match config.key {
            RateLimitKey::Ip => self.client_ip.to_string(),
            RateLimitKey::Header => headers
                .get(config.header_name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
                // Requests without the key header share one bucket.
                .unwrap_or_else(|| "anonymous".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn context(headers: &HeaderMap) -> RequestContext {
        RequestContext::new(
            "req-1".to_string(),
            "198.51.100.4:9999".parse().unwrap(),
            Method::GET,
            "/x".to_string(),
            Some("x-session-id"),
            headers,
        )
    }

    #[test]
    fn test_session_id_extraction() {
        let with = headers(&[("x-session-id", "abc")]);
        assert_eq!(context(&with).session_id.as_deref(), Some("abc"));

        let without = headers(&[]);
        assert_eq!(context(&without).session_id, None);
    }

    #[test]
    fn test_rate_limit_key_sources() {
        let hs = headers(&[("x-api-key", "tenant-7")]);
        let ctx = context(&hs);

        let by_ip = RateLimitConfig {
            key: RateLimitKey::Ip,
            ..Default::default()
        };
        assert_eq!(ctx.rate_limit_key(&by_ip, &hs), "198.51.100.4");

        let by_header = RateLimitConfig {
            key: RateLimitKey::Header,
            header_name: "x-api-key".to_string(),
            ..Default::default()
        };
        assert_eq!(ctx.rate_limit_key(&by_header, &hs), "tenant-7");

        let missing = headers(&[]);
        assert_eq!(ctx.rate_limit_key(&by_header, &missing), "anonymous");
    }
}
