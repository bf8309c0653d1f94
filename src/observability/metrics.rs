//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (requests, latency, errors, cache, backends)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Maintain an owned aggregate snapshotted onto the event bus
//!
//! # Metrics
//! - `relayd_requests_total` (counter): requests by method, status, backend
//! - `relayd_request_duration_seconds` (histogram): latency distribution
//! - `relayd_backend_health` (gauge): 1=eligible, 0=out of rotation
//! - `relayd_rate_limited_total` (counter): denied admissions
//! - `relayd_cache_hits_total` / `relayd_cache_misses_total` (counters)
//!
//! # Design Decisions
//! - Low-overhead record points (atomic operations)
//! - The owned aggregate backs the admin API and the snapshot events;
//!   the metrics macros back Prometheus — both fed from the same calls

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info};

use crate::load_balancer::backend::ServerStatus;

/// Install the Prometheus exporter on its own listener.
pub fn init_exporter(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(_) => info!(address = %addr, "metrics exporter listening"),
        Err(e) => error!(error = %e, "failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, backend: &str, started: Instant) {
    metrics::counter!(
        "relayd_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!("relayd_request_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited(key_kind: &str) {
    metrics::counter!("relayd_rate_limited_total", "kind" => key_kind.to_string()).increment(1);
}

pub fn record_backend_health(backend: &str, eligible: bool) {
    metrics::gauge!("relayd_backend_health", "backend" => backend.to_string())
        .set(if eligible { 1.0 } else { 0.0 });
}

pub fn record_cache(hit: bool) {
    if hit {
        metrics::counter!("relayd_cache_hits_total").increment(1);
    } else {
        metrics::counter!("relayd_cache_misses_total").increment(1);
    }
}

/// Outcome class recorded into the owned aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Default)]
struct ServerCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    response_time_total_ms: AtomicU64,
}

/// Owned cumulative aggregate behind the admin API and snapshot events.
#[derive(Debug)]
pub struct LoadBalancerMetrics {
    started: Instant,
    requests_total: AtomicU64,
    success_total: AtomicU64,
    failure_total: AtomicU64,
    bytes_out: AtomicU64,
    response_time_total_ms: AtomicU64,
    errors_by_status: DashMap<u16, u64>,
    per_server: DashMap<String, ServerCounters>,
    /// (instant, requests_total) at the previous snapshot, for throughput.
    last_snapshot: Mutex<(Instant, u64)>,
}

impl LoadBalancerMetrics {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            requests_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            response_time_total_ms: AtomicU64::new(0),
            errors_by_status: DashMap::new(),
            per_server: DashMap::new(),
            last_snapshot: Mutex::new((now, 0)),
        }
    }

    /// Fold one completed request into the aggregate. `backend` is absent
    /// when the request never reached selection (rejects, rate limits,
    /// cache hits, 503s).
    pub fn record(
        &self,
        outcome: Outcome,
        status: u16,
        backend: Option<&str>,
        elapsed: Duration,
        bytes_out: u64,
    ) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let elapsed_ms = elapsed.as_millis() as u64;
        self.response_time_total_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);

        match outcome {
            Outcome::Success => {
                self.success_total.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Failure => {
                self.failure_total.fetch_add(1, Ordering::Relaxed);
                *self.errors_by_status.entry(status).or_insert(0) += 1;
            }
        }

        if let Some(backend) = backend {
            let counters = self
                .per_server
                .entry(backend.to_string())
                .or_default();
            counters.requests.fetch_add(1, Ordering::Relaxed);
            counters
                .response_time_total_ms
                .fetch_add(elapsed_ms, Ordering::Relaxed);
            if outcome == Outcome::Failure {
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Build a point-in-time snapshot. Throughput is measured over the
    /// window since the previous snapshot.
    pub fn snapshot(&self, cache_hit_rate: f64, backends: &[BackendObservation]) -> MetricsSnapshot {
        let requests_total = self.requests_total.load(Ordering::Relaxed);

        let throughput_rps = {
            let mut last = self.last_snapshot.lock().expect("metrics lock poisoned");
            let (last_at, last_requests) = *last;
            let window = last_at.elapsed().as_secs_f64();
            let delta = requests_total.saturating_sub(last_requests);
            *last = (Instant::now(), requests_total);
            if window > 0.0 {
                delta as f64 / window
            } else {
                0.0
            }
        };

        let avg_response_time_ms = if requests_total > 0 {
            self.response_time_total_ms.load(Ordering::Relaxed) as f64 / requests_total as f64
        } else {
            0.0
        };

        let per_server = backends
            .iter()
            .map(|b| {
                let (requests, failures, avg_ms) = self
                    .per_server
                    .get(&b.id)
                    .map(|c| {
                        let requests = c.requests.load(Ordering::Relaxed);
                        let failures = c.failures.load(Ordering::Relaxed);
                        let total_ms = c.response_time_total_ms.load(Ordering::Relaxed);
                        let avg = if requests > 0 {
                            total_ms as f64 / requests as f64
                        } else {
                            0.0
                        };
                        (requests, failures, avg)
                    })
                    .unwrap_or((0, 0, 0.0));
                (
                    b.id.clone(),
                    ServerSnapshot {
                        pool: b.pool.clone(),
                        status: b.status,
                        active_connections: b.active_connections,
                        requests,
                        failures,
                        avg_response_time_ms: avg_ms,
                        ewma_response_time_ms: b.ewma_response_time_ms,
                        error_rate: b.error_rate,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            taken_at_epoch_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            uptime_secs: self.started.elapsed().as_secs(),
            requests_total,
            success_total: self.success_total.load(Ordering::Relaxed),
            failure_total: self.failure_total.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            errors_by_status: self
                .errors_by_status
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect(),
            throughput_rps,
            avg_response_time_ms,
            cache_hit_rate,
            per_server,
        }
    }
}

impl Default for LoadBalancerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Live backend state sampled at snapshot time.
#[derive(Debug, Clone)]
pub struct BackendObservation {
    pub id: String,
    pub pool: String,
    pub status: ServerStatus,
    pub active_connections: u32,
    pub ewma_response_time_ms: f64,
    pub error_rate: f64,
}

/// Aggregate published on the event bus and served by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub taken_at_epoch_ms: u64,
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub success_total: u64,
    pub failure_total: u64,
    pub bytes_out: u64,
    pub errors_by_status: HashMap<u16, u64>,
    pub throughput_rps: f64,
    pub avg_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub per_server: HashMap<String, ServerSnapshot>,
}

/// Per-backend slice of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    pub pool: String,
    pub status: ServerStatus,
    pub active_connections: u32,
    pub requests: u64,
    pub failures: u64,
    pub avg_response_time_ms: f64,
    pub ewma_response_time_ms: f64,
    pub error_rate: f64,
}
