//! Crate-wide error types.
//!
//! # Responsibilities
//! - Classify request-path failures (rate limited, no backend, upstream error)
//! - Map each class to the HTTP status surfaced to the client
//! - Carry configuration/startup failures out of the loader
//!
//! # Design Decisions
//! - Rate-limit and no-healthy-backend outcomes are never retried
//! - Timeouts are folded into the backend-error class for retry purposes
//! - Clients get structured JSON bodies, never internal error text

use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced while serving a proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Client exhausted its token bucket (or is deny-listed).
    #[error("rate limit exceeded")]
    RateLimited,

    /// No enabled pool yielded an eligible backend.
    #[error("no healthy backend available")]
    NoHealthyBackend,

    /// Forwarding failed or the backend returned a transport-level failure.
    #[error("backend request failed: {0}")]
    Backend(String),

    /// The forwarding call exceeded its hard deadline.
    #[error("backend request timed out")]
    Timeout,

    /// A routing rule rejected the request explicitly.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

impl ProxyError {
    /// HTTP status code this error maps to at the client boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::NoHealthyBackend => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Backend(_) | ProxyError::Timeout => StatusCode::BAD_GATEWAY,
            ProxyError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::FORBIDDEN)
            }
        }
    }

    /// Whether the dispatcher may retry against an alternate backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProxyError::Backend(_) | ProxyError::Timeout)
    }
}

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ProxyError::NoHealthyBackend.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::Timeout.status_code(),
            StatusCode::BAD_GATEWAY
        );
        let rejected = ProxyError::Rejected {
            status: 451,
            message: "blocked".into(),
        };
        assert_eq!(rejected.status_code().as_u16(), 451);
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ProxyError::Timeout.is_retryable());
        assert!(ProxyError::Backend("connection refused".into()).is_retryable());
        assert!(!ProxyError::RateLimited.is_retryable());
        assert!(!ProxyError::NoHealthyBackend.is_retryable());
    }
}
