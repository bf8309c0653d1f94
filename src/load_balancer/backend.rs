//! Backend server abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server with its live state
//! - Track active connections (for Least Connections LB)
//! - Enforce max connection limits
//! - Track health status, failure counts, and response-time EWMA
//!
//! # Design Decisions
//! - All mutable state is atomic; no per-server mutex on the request path
//! - Draining/Maintenance are operator states, never set by probes
//! - Response-time EWMA stored as f64 bits in an AtomicU64

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::schema::BackendConfig;

/// Smoothing factor for the response-time EWMA.
const EWMA_ALPHA: f64 = 0.3;

/// Operational status of a backend.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Healthy = 0,
    Unhealthy = 1,
    Draining = 2,
    Maintenance = 3,
}

impl From<u8> for ServerStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => ServerStatus::Unhealthy,
            2 => ServerStatus::Draining,
            3 => ServerStatus::Maintenance,
            _ => ServerStatus::Healthy,
        }
    }
}

/// A single backend server and its live state.
#[derive(Debug)]
pub struct BackendServer {
    /// Unique identifier, referenced by sticky sessions and the admin API.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Pre-built base URL for forwarding (scheme://host:port).
    pub base_url: String,
    /// Default weight for weighted selection.
    pub weight: u32,
    /// Backup servers only serve when no primary is healthy.
    pub backup: bool,
    /// Maximum concurrent connections.
    pub max_connections: u32,
    /// Skip TLS verification when probing/forwarding over https.
    pub insecure_skip_verify: bool,

    /// Number of currently active connections.
    active_connections: AtomicU32,
    /// Current status, see [`ServerStatus`].
    status: AtomicU8,
    /// Consecutive probe failures.
    consecutive_failures: AtomicU32,
    /// Response-time EWMA in milliseconds, stored as f64 bits. 0 = unset.
    ewma_bits: AtomicU64,
    /// Total requests forwarded.
    requests_total: AtomicU64,
    /// Requests that ended in a backend error.
    requests_failed: AtomicU64,
    /// Unix millis of the last completed health probe.
    last_health_check_ms: AtomicU64,
}

impl BackendServer {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            base_url: config.base_url(),
            weight: config.weight.max(1),
            backup: config.backup,
            max_connections: config.max_connections,
            insecure_skip_verify: config.insecure_skip_verify,
            active_connections: AtomicU32::new(0),
            status: AtomicU8::new(ServerStatus::Healthy as u8),
            consecutive_failures: AtomicU32::new(0),
            ewma_bits: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            last_health_check_ms: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status.load(Ordering::Relaxed).into()
    }

    /// Operator-level status override (drain, maintenance, re-enable).
    pub fn set_status(&self, status: ServerStatus) {
        self.status.store(status as u8, Ordering::Relaxed);
    }

    /// Only healthy servers are eligible for new selections.
    pub fn is_eligible(&self) -> bool {
        self.status() == ServerStatus::Healthy
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Current response-time EWMA in milliseconds (0.0 until first sample).
    pub fn response_time_ms(&self) -> f64 {
        f64::from_bits(self.ewma_bits.load(Ordering::Relaxed))
    }

    /// Fold a response-time sample into the EWMA.
    pub fn record_response_time(&self, sample_ms: f64) {
        let mut current = self.ewma_bits.load(Ordering::Relaxed);
        loop {
            let prev = f64::from_bits(current);
            let next = if current == 0 {
                sample_ms
            } else {
                EWMA_ALPHA * sample_ms + (1.0 - EWMA_ALPHA) * prev
            };
            match self.ewma_bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Record a forwarding outcome for error-rate accounting.
    pub fn record_result(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fraction of forwarded requests that failed, in [0, 1].
    pub fn error_rate(&self) -> f64 {
        let total = self.requests_total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.requests_failed.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn last_health_check_ms(&self) -> u64 {
        self.last_health_check_ms.load(Ordering::Relaxed)
    }

    /// Record a successful probe. Returns true when the server transitioned
    /// from Unhealthy back to Healthy.
    pub fn mark_probe_success(&self) -> bool {
        self.stamp_health_check();
        self.consecutive_failures.store(0, Ordering::Relaxed);

        // Probes never override operator states.
        self.status
            .compare_exchange(
                ServerStatus::Unhealthy as u8,
                ServerStatus::Healthy as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Record a failed probe. Returns true when the failure threshold was
    /// crossed and the server transitioned from Healthy to Unhealthy.
    pub fn mark_probe_failure(&self, failure_threshold: u32) -> bool {
        self.stamp_health_check();
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if failures < failure_threshold {
            return false;
        }
        self.status
            .compare_exchange(
                ServerStatus::Healthy as u8,
                ServerStatus::Unhealthy as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    fn stamp_health_check(&self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_health_check_ms.store(now_ms, Ordering::Relaxed);
    }

}

/// RAII guard holding one connection slot on a backend.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<BackendServer>,
}

impl ConnectionGuard {
    /// Try to acquire a connection slot, respecting max_connections.
    /// The slot is released when the guard drops.
    pub fn acquire(backend: &Arc<BackendServer>) -> Option<Self> {
        let mut prev = backend.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= backend.max_connections {
                return None;
            }
            match backend.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => prev = observed,
            }
        }
        Some(Self {
            backend: backend.clone(),
        })
    }

    pub fn backend(&self) -> &Arc<BackendServer> {
        &self.backend
    }
}

impl std::ops::Deref for ConnectionGuard {
    type Target = BackendServer;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend
            .active_connections
            .fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Protocol;

    pub(crate) fn test_config(id: &str) -> BackendConfig {
        BackendConfig {
            id: id.to_string(),
            name: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: Protocol::Http,
            weight: 1,
            backup: false,
            max_connections: 2,
            insecure_skip_verify: false,
        }
    }

    #[test]
    fn test_connection_guard_releases_slot() {
        let backend = Arc::new(BackendServer::from_config(&test_config("b1")));

        let g1 = ConnectionGuard::acquire(&backend).unwrap();
        let g2 = ConnectionGuard::acquire(&backend).unwrap();
        assert_eq!(backend.active_connections(), 2);
        // At capacity.
        assert!(ConnectionGuard::acquire(&backend).is_none());

        drop(g1);
        assert_eq!(backend.active_connections(), 1);
        let _g3 = ConnectionGuard::acquire(&backend).unwrap();
        drop(g2);
    }

    #[test]
    fn test_failure_threshold_transitions_once() {
        let backend = BackendServer::from_config(&test_config("b1"));

        assert!(!backend.mark_probe_failure(3));
        assert!(!backend.mark_probe_failure(3));
        // Third failure crosses the threshold.
        assert!(backend.mark_probe_failure(3));
        assert_eq!(backend.status(), ServerStatus::Unhealthy);
        // Further failures are idempotent.
        assert!(!backend.mark_probe_failure(3));

        // One success restores health.
        assert!(backend.mark_probe_success());
        assert_eq!(backend.status(), ServerStatus::Healthy);
        assert_eq!(backend.consecutive_failures(), 0);
    }

    #[test]
    fn test_probes_do_not_override_operator_states() {
        let backend = BackendServer::from_config(&test_config("b1"));
        backend.set_status(ServerStatus::Draining);

        assert!(!backend.mark_probe_success());
        assert_eq!(backend.status(), ServerStatus::Draining);

        for _ in 0..5 {
            backend.mark_probe_failure(3);
        }
        assert_eq!(backend.status(), ServerStatus::Draining);

        backend.set_status(ServerStatus::Maintenance);
        assert!(!backend.mark_probe_success());
        assert_eq!(backend.status(), ServerStatus::Maintenance);
    }

    #[test]
    fn test_ewma_seeds_then_smooths() {
        let backend = BackendServer::from_config(&test_config("b1"));
        assert_eq!(backend.response_time_ms(), 0.0);

        backend.record_response_time(100.0);
        assert_eq!(backend.response_time_ms(), 100.0);

        backend.record_response_time(200.0);
        let ewma = backend.response_time_ms();
        assert!((ewma - 130.0).abs() < 1e-9, "got {}", ewma);
    }

    #[test]
    fn test_error_rate() {
        let backend = BackendServer::from_config(&test_config("b1"));
        assert_eq!(backend.error_rate(), 0.0);

        backend.record_result(true);
        backend.record_result(true);
        backend.record_result(false);
        backend.record_result(true);
        assert!((backend.error_rate() - 0.25).abs() < 1e-9);
    }
}
