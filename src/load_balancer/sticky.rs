//! Sticky session store.
//!
//! # Responsibilities
//! - Pin a session key to a backend id for a bounded time
//! - Validate pins against current backend eligibility on lookup
//! - Sweep expired pins so abandoned sessions do not accumulate
//!
//! # Design Decisions
//! - Pins reference backends by id, never by pointer
//! - TTL is authoritative on read; the sweep only reclaims memory
//! - Lookup refreshes the TTL (sessions stay pinned while active)

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Pin {
    server_id: String,
    expires_at: Instant,
}

/// Session-key → backend-id map with TTL expiry.
#[derive(Debug)]
pub struct SessionStore {
    pins: DashMap<String, Pin>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pins: DashMap::new(),
            ttl,
        }
    }

    /// Resolve a session to its pinned backend id, refreshing the TTL.
    /// Expired pins are removed on the spot.
    pub fn lookup(&self, session: &str) -> Option<String> {
        let now = Instant::now();
        let mut entry = self.pins.get_mut(session)?;
        if entry.expires_at <= now {
            drop(entry);
            self.pins.remove(session);
            return None;
        }
        entry.expires_at = now + self.ttl;
        Some(entry.server_id.clone())
    }

    /// Record (or replace) the pin for a session.
    pub fn record(&self, session: &str, server_id: &str) {
        self.pins.insert(
            session.to_string(),
            Pin {
                server_id: server_id.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop the pin for a session, if any.
    pub fn forget(&self, session: &str) {
        self.pins.remove(session);
    }

    /// Remove expired pins. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.pins.len();
        self.pins.retain(|_, pin| pin.expires_at > now);
        before - self.pins.len()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.record("sess-1", "backend-a");
        assert_eq!(store.lookup("sess-1").as_deref(), Some("backend-a"));
        assert_eq!(store.lookup("sess-2"), None);
    }

    #[test]
    fn test_expired_pin_is_dropped() {
        let store = SessionStore::new(Duration::from_millis(0));
        store.record("sess-1", "backend-a");
        // Zero TTL: expired immediately.
        assert_eq!(store.lookup("sess-1"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rerecord_replaces_pin() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.record("sess-1", "backend-a");
        store.record("sess-1", "backend-b");
        assert_eq!(store.lookup("sess-1").as_deref(), Some("backend-b"));
    }

    #[test]
    fn test_sweep_reclaims_expired() {
        let store = SessionStore::new(Duration::from_millis(0));
        store.record("sess-1", "backend-a");
        store.record("sess-2", "backend-b");
        assert_eq!(store.sweep(), 2);
        assert!(store.is_empty());
    }
}
