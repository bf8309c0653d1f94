//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after rule evaluation):
//!     → rate_limit.rs (deny list, allow list, token bucket)
//!     → Pass to cache lookup / selection
//! ```
//!
//! # Design Decisions
//! - Deny list beats allow list beats token accounting
//! - Fail closed: a request without a derivable key uses a shared key
//! - Bucket map is sharded; no global mutex on the admission path

pub mod rate_limit;

pub use rate_limit::RateLimiter;
