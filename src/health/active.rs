//! Active health checking.
//!
//! # Responsibilities
//! - Probe each backend on its own independent timer
//! - Delay the first probe by a grace period after registration
//! - Update backend status and publish transition events
//!
//! # Design Decisions
//! - One task per backend: a hanging probe never delays the others
//! - Every probe carries a hard timeout
//! - Probe tasks exit when their pool disappears or shutdown fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request};
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::schema::HealthCheckConfig;
use crate::events::{Event, EventBus};
use crate::http::client::UpstreamClient;
use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::pool::{PoolSet, ServerPool};
use crate::observability::metrics;

/// Spawns and owns the per-backend probe tasks.
pub struct HealthMonitor {
    pools: Arc<PoolSet>,
    client: UpstreamClient,
    events: EventBus,
}

impl HealthMonitor {
    pub fn new(pools: Arc<PoolSet>, client: UpstreamClient, events: EventBus) -> Self {
        Self {
            pools,
            client,
            events,
        }
    }

    /// Spawn probe tasks for every backend of every current pool.
    pub fn spawn_all(&self, shutdown: &broadcast::Sender<()>) {
        for pool in self.pools.by_priority() {
            self.spawn_for_pool(&pool, shutdown);
        }
    }

    /// Spawn probe tasks for one pool (also used when a pool is added at
    /// runtime).
    pub fn spawn_for_pool(&self, pool: &Arc<ServerPool>, shutdown: &broadcast::Sender<()>) {
        let policy = pool.health_check.clone();
        if !policy.enabled {
            info!(pool = %pool.id, "active health checks disabled");
            return;
        }

        for backend in pool.backends() {
            let task = ProbeTask {
                pools: self.pools.clone(),
                pool_id: pool.id.clone(),
                backend: backend.clone(),
                policy: policy.clone(),
                client: self.client.clone(),
                events: self.events.clone(),
            };
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(task.run(shutdown_rx));
        }
    }
}

struct ProbeTask {
    pools: Arc<PoolSet>,
    pool_id: String,
    backend: Arc<BackendServer>,
    policy: HealthCheckConfig,
    client: UpstreamClient,
    events: EventBus,
}

impl ProbeTask {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!(
            pool = %self.pool_id,
            backend = %self.backend.id,
            grace_secs = self.policy.grace_period_secs,
            "probe task starting"
        );

        // Grace period before the first probe of a fresh backend.
        tokio::select! {
            _ = time::sleep(Duration::from_secs(self.policy.grace_period_secs)) => {}
            _ = shutdown.recv() => return,
        }

        let mut ticker = time::interval(Duration::from_secs(self.policy.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Pool removed or replaced via the admin API: stop
                    // probing the orphaned backend object.
                    let still_registered = self
                        .pools
                        .get(&self.pool_id)
                        .and_then(|pool| pool.backend_by_id(&self.backend.id))
                        .is_some_and(|current| Arc::ptr_eq(&current, &self.backend));
                    if !still_registered {
                        debug!(pool = %self.pool_id, backend = %self.backend.id, "backend gone, probe task exiting");
                        return;
                    }
                    self.probe_once().await;
                }
                _ = shutdown.recv() => {
                    debug!(backend = %self.backend.id, "probe task received shutdown");
                    return;
                }
            }
        }
    }

    async fn probe_once(&self) {
        let healthy = self.execute_probe().await;
        metrics::record_backend_health(&self.backend.id, self.backend.is_eligible());

        if healthy {
            if self.backend.mark_probe_success() {
                info!(
                    pool = %self.pool_id,
                    backend = %self.backend.id,
                    "backend recovered"
                );
                self.events.publish(Event::BackendRecovered {
                    pool: self.pool_id.clone(),
                    backend: self.backend.id.clone(),
                });
            }
        } else if self.backend.mark_probe_failure(self.policy.failure_threshold) {
            warn!(
                pool = %self.pool_id,
                backend = %self.backend.id,
                threshold = self.policy.failure_threshold,
                "backend marked unhealthy"
            );
            self.events.publish(Event::BackendFailed {
                pool: self.pool_id.clone(),
                backend: self.backend.id.clone(),
            });
        }
    }

    /// One probe round-trip. True only when status and (optionally) body
    /// pass the configured checks within the deadline.
    async fn execute_probe(&self) -> bool {
        let uri = format!("{}{}", self.backend.base_url, self.policy.path);
        let method = Method::from_bytes(self.policy.method.as_bytes())
            .unwrap_or(Method::GET);

        let request = match Request::builder()
            .method(method)
            .uri(&uri)
            .header("user-agent", "relayd-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                warn!(backend = %self.backend.id, error = %e, "failed to build probe request");
                return false;
            }
        };

        let deadline = Duration::from_secs(self.policy.timeout_secs);
        let client = self.client.for_backend(&self.backend);
        let started = Instant::now();

        let response = match time::timeout(deadline, client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(backend = %self.backend.id, error = %e, "probe failed: connection error");
                return false;
            }
            Err(_) => {
                debug!(backend = %self.backend.id, "probe failed: timeout");
                return false;
            }
        };

        let status = response.status();
        let status_ok = if self.policy.expected_statuses.is_empty() {
            status.is_success()
        } else {
            self.policy.expected_statuses.contains(&status.as_u16())
        };
        if !status_ok {
            debug!(backend = %self.backend.id, status = %status, "probe failed: unexpected status");
            return false;
        }

        if let Some(needle) = &self.policy.body_substring {
            let remaining = deadline.saturating_sub(started.elapsed());
            let body = Body::new(response.into_body());
            let bytes = match time::timeout(
                remaining,
                axum::body::to_bytes(body, 64 * 1024),
            )
            .await
            {
                Ok(Ok(bytes)) => bytes,
                _ => {
                    debug!(backend = %self.backend.id, "probe failed: body read");
                    return false;
                }
            };
            if !String::from_utf8_lossy(&bytes).contains(needle.as_str()) {
                debug!(backend = %self.backend.id, "probe failed: body mismatch");
                return false;
            }
        }

        true
    }
}
