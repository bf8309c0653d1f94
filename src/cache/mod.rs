//! In-memory response cache.
//!
//! # Data Flow
//! ```text
//! Dispatcher (GET request)
//!     → policy.rs (cacheable? derive key)
//!     → lookup: expired-on-read entries are dropped
//!     → on upstream 2xx: store, evicting soonest-expiry entries when the
//!       byte budget would be exceeded
//! ```
//!
//! # Design Decisions
//! - TTL is checked on every read; the size budget is enforced on write
//! - Eviction drains to 80% of the maximum, ordered by soonest expiry
//! - Entries are immutable; a store replaces, never mutates

pub mod policy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use dashmap::DashMap;
use tracing::debug;

use crate::config::schema::CacheConfig;

/// Fraction of the byte budget eviction drains down to.
const EVICTION_WATERMARK: f64 = 0.8;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expires_at: Instant,
    pub size: usize,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// TTL + size-bounded response cache.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<u64, CacheEntry>,
    current_bytes: AtomicU64,
    /// Serializes eviction passes; lookups and stores stay lock-free.
    eviction: Mutex<()>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            current_bytes: AtomicU64::new(0),
            eviction: Mutex::new(()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch a live entry, dropping it if the TTL has lapsed.
    pub fn get(&self, key: u64) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }
        let hit = match self.entries.get(&key) {
            Some(entry) if !entry.is_expired() => Some(entry.clone()),
            Some(entry) => {
                let size = entry.size as u64;
                drop(entry);
                if self.entries.remove(&key).is_some() {
                    self.current_bytes.fetch_sub(size, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };
        match &hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Store a response under the given key.
    pub fn put(&self, key: u64, status: StatusCode, headers: HeaderMap, body: Bytes) {
        if !self.config.enabled {
            return;
        }
        let size = body.len()
            + headers
                .iter()
                .map(|(name, value)| name.as_str().len() + value.len())
                .sum::<usize>();
        // An entry bigger than the whole budget can never fit.
        if size as u64 > self.config.max_size_bytes {
            return;
        }

        self.ensure_space(size as u64);

        let entry = CacheEntry {
            status,
            headers,
            body,
            expires_at: Instant::now() + Duration::from_secs(self.config.ttl_secs),
            size,
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.current_bytes.fetch_sub(old.size as u64, Ordering::Relaxed);
        }
        self.current_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Evict soonest-expiry entries until the addition fits under the
    /// budget and usage is at or below the watermark.
    fn ensure_space(&self, incoming: u64) {
        if self.current_bytes.load(Ordering::Relaxed) + incoming <= self.config.max_size_bytes {
            return;
        }
        let _guard = self.eviction.lock().expect("cache eviction lock poisoned");
        // Re-check under the lock; a concurrent pass may have drained enough.
        if self.current_bytes.load(Ordering::Relaxed) + incoming <= self.config.max_size_bytes {
            return;
        }

        let mut candidates: Vec<(u64, Instant, u64)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.expires_at, e.size as u64))
            .collect();
        candidates.sort_by_key(|(_, expires_at, _)| *expires_at);

        let target = (self.config.max_size_bytes as f64 * EVICTION_WATERMARK) as u64;
        let mut evicted = 0usize;
        for (key, _, size) in candidates {
            if self.current_bytes.load(Ordering::Relaxed) <= target {
                break;
            }
            if self.entries.remove(&key).is_some() {
                self.current_bytes.fetch_sub(size, Ordering::Relaxed);
                evicted += 1;
            }
        }
        debug!(evicted, bytes = self.current_bytes.load(Ordering::Relaxed), "cache eviction pass");
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate in [0, 1] since startup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.current_bytes.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64, max_size_bytes: u64) -> ResponseCache {
        ResponseCache::new(CacheConfig {
            enabled: true,
            ttl_secs,
            max_size_bytes,
            ..Default::default()
        })
    }

    fn put_body(cache: &ResponseCache, key: u64, body: &'static [u8]) {
        cache.put(key, StatusCode::OK, HeaderMap::new(), Bytes::from_static(body));
    }

    #[test]
    fn test_get_roundtrip() {
        let cache = cache(60, 1024);
        put_body(&cache, 1, b"hello");
        let entry = cache.get(1).unwrap();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(&entry.body[..], b"hello");
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_expired_entry_dropped_on_read() {
        let cache = cache(0, 1024);
        put_body(&cache, 1, b"stale");
        assert!(cache.get(1).is_none());
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn test_eviction_to_watermark() {
        let cache = cache(60, 100);
        // Four 25-byte bodies fill the budget exactly.
        put_body(&cache, 1, &[b'a'; 25]);
        put_body(&cache, 2, &[b'b'; 25]);
        put_body(&cache, 3, &[b'c'; 25]);
        put_body(&cache, 4, &[b'd'; 25]);
        assert_eq!(cache.current_bytes(), 100);

        // A fifth entry forces eviction down to <= 80 before inserting.
        put_body(&cache, 5, &[b'e'; 25]);
        assert!(cache.current_bytes() <= 100);
        assert!(cache.get(5).is_some());
        // The soonest-expiry entries (the oldest stores) went first.
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let cache = cache(60, 10);
        put_body(&cache, 1, &[b'x'; 64]);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_replace_accounts_bytes_once() {
        let cache = cache(60, 1024);
        put_body(&cache, 1, &[b'x'; 10]);
        put_body(&cache, 1, &[b'y'; 30]);
        assert_eq!(cache.current_bytes(), 30);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_hit_rate() {
        let cache = cache(60, 1024);
        put_body(&cache, 1, b"x");
        cache.get(1);
        cache.get(2);
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }
}
