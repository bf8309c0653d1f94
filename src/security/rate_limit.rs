//! Token-bucket rate limiting.
//!
//! # Responsibilities
//! - Per-key admission control with a sustained rate and a burst reserve
//! - Unconditional allow/deny lists, checked before token accounting
//! - Periodic sweep of idle buckets to bound memory
//!
//! # Design Decisions
//! - Buckets refill continuously, proportional to elapsed time
//! - The burst reserve is a second pool consumed only when the main
//!   bucket is empty
//! - Sweeping uses the last-refill timestamp; hot keys are never dropped

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::schema::RateLimitConfig;

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    burst_tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: f64) -> Self {
        Self {
            tokens: rate,
            burst_tokens: burst,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self, rate: f64, burst: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.burst_tokens = (self.burst_tokens + elapsed * rate).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else if self.burst_tokens >= 1.0 {
            self.burst_tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-key token-bucket limiter with allow/deny lists.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check one request under the given key.
    pub fn check(&self, key: &str) -> Admission {
        if !self.config.enabled {
            return Admission::Allowed;
        }
        // List membership outranks token accounting.
        if self.config.denylist.iter().any(|k| k == key) {
            return Admission::Denied;
        }
        if self.config.allowlist.iter().any(|k| k == key) {
            return Admission::Allowed;
        }

        let rate = self.config.requests_per_second as f64;
        let burst = self.config.burst_size as f64;
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(rate, burst));

        if bucket.try_acquire(rate, burst) {
            Admission::Allowed
        } else {
            Admission::Denied
        }
    }

    /// Drop buckets that have been idle past the configured horizon.
    /// Returns how many were removed.
    pub fn sweep_idle(&self) -> usize {
        let horizon = Duration::from_secs(self.config.sweep_idle_secs);
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < horizon);
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(removed, remaining = self.buckets.len(), "swept idle rate-limit buckets");
        }
        removed
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
