//! Cacheability policy and key derivation.
//!
//! # Responsibilities
//! - Decide whether a request/response pair may be cached
//! - Derive a deterministic cache key from method, path, and vary headers
//!
//! # Design Decisions
//! - Only GET with a 2xx response is ever cacheable
//! - Exclude paths beat include paths; a non-empty include list is a
//!   closed allowlist
//! - The key folds in every configured vary header, present or not

use std::hash::{Hash, Hasher};

use axum::http::{HeaderMap, Method, StatusCode};

use crate::config::schema::CacheConfig;

/// True when the request side allows serving/storing a cached response.
pub fn request_cacheable(config: &CacheConfig, method: &Method, path: &str) -> bool {
    if method != Method::GET {
        return false;
    }
    if config
        .exclude_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return false;
    }
    if !config.include_paths.is_empty()
        && !config
            .include_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return false;
    }
    true
}

/// True when the client did not forbid cache participation.
pub fn request_allows_cache(headers: &HeaderMap) -> bool {
    !cache_control_forbids(headers)
}

/// True when an upstream response may be stored.
pub fn response_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    status.is_success() && !cache_control_forbids(headers)
}

fn cache_control_forbids(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let v = v.to_ascii_lowercase();
            v.contains("no-cache") || v.contains("no-store") || v.contains("private")
        })
        .unwrap_or(false)
}

/// Deterministic key over method + path + configured vary headers.
pub fn cache_key(
    config: &CacheConfig,
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
) -> u64 {
    let mut hasher = ahash::AHasher::default();
    method.as_str().hash(&mut hasher);
    path_and_query.hash(&mut hasher);
    for name in &config.vary_headers {
        name.to_ascii_lowercase().hash(&mut hasher);
        let value = headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        value.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_only_get_is_cacheable() {
        let cfg = config();
        assert!(request_cacheable(&cfg, &Method::GET, "/x"));
        assert!(!request_cacheable(&cfg, &Method::POST, "/x"));
        assert!(!request_cacheable(&cfg, &Method::HEAD, "/x"));
    }

    #[test]
    fn test_exclude_beats_include() {
        let mut cfg = config();
        cfg.include_paths = vec!["/api".to_string()];
        cfg.exclude_paths = vec!["/api/private".to_string()];

        assert!(request_cacheable(&cfg, &Method::GET, "/api/things"));
        assert!(!request_cacheable(&cfg, &Method::GET, "/api/private/things"));
        // Outside the include list entirely.
        assert!(!request_cacheable(&cfg, &Method::GET, "/assets/app.js"));
    }

    #[test]
    fn test_no_cache_directive_blocks() {
        let mut headers = HeaderMap::new();
        assert!(request_allows_cache(&headers));
        headers.insert(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        );
        assert!(!request_allows_cache(&headers));
    }

    #[test]
    fn test_response_must_be_2xx() {
        let headers = HeaderMap::new();
        assert!(response_cacheable(StatusCode::OK, &headers));
        assert!(!response_cacheable(StatusCode::NOT_FOUND, &headers));
        assert!(!response_cacheable(StatusCode::BAD_GATEWAY, &headers));
    }

    #[test]
    fn test_vary_headers_split_keys() {
        let cfg = config(); // varies on accept-encoding by default
        let mut gzip = HeaderMap::new();
        gzip.insert("accept-encoding", HeaderValue::from_static("gzip"));
        let plain = HeaderMap::new();

        let k1 = cache_key(&cfg, &Method::GET, "/x", &gzip);
        let k2 = cache_key(&cfg, &Method::GET, "/x", &plain);
        let k3 = cache_key(&cfg, &Method::GET, "/x", &gzip);
        assert_ne!(k1, k2);
        assert_eq!(k1, k3);
    }

    #[test]
    fn test_query_string_distinguishes_keys() {
        let cfg = config();
        let headers = HeaderMap::new();
        let k1 = cache_key(&cfg, &Method::GET, "/x?page=1", &headers);
        let k2 = cache_key(&cfg, &Method::GET, "/x?page=2", &headers);
        assert_ne!(k1, k2);
    }
}
