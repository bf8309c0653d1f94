//! Failure handling for upstream calls.
//!
//! # Design Decisions
//! - One retry against a different backend; never against the same one
//! - Rate-limit and no-backend outcomes are surfaced immediately
//! - Jittered delay between attempts prevents synchronized retries

pub mod backoff;

pub use backoff::retry_delay;
