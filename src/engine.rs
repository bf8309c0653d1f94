//! The load balancer engine.
//!
//! # Responsibilities
//! - Own every shared structure: pools, rules, limiter, cache, metrics,
//!   the event bus, and the upstream client
//! - Expose the in-process administrative surface (pool/rule add/remove,
//!   backend drain/enable, metric snapshots)
//! - Spawn and coordinate background tasks
//!
//! # Design Decisions
//! - No module-level singletons; everything lives on this instance
//! - Each shared map has its own synchronization; there is no engine-wide
//!   lock on the request path
//! - Admin mutations publish typed events for external collaborators

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::cache::ResponseCache;
use crate::config::schema::{BalancerConfig, PoolConfig, RuleConfig};
use crate::error::ConfigError;
use crate::events::{Event, EventBus};
use crate::health::HealthMonitor;
use crate::http::client::UpstreamClient;
use crate::lifecycle::Shutdown;
use crate::load_balancer::backend::ServerStatus;
use crate::load_balancer::pool::{PoolSet, ServerPool};
use crate::observability::metrics::{
    BackendObservation, LoadBalancerMetrics, MetricsSnapshot,
};
use crate::routing::RuleEngine;
use crate::security::RateLimiter;

/// One embeddable load balancer instance.
pub struct Engine {
    pub config: BalancerConfig,
    pools: Arc<PoolSet>,
    rules: RuleEngine,
    limiter: RateLimiter,
    cache: ResponseCache,
    metrics: LoadBalancerMetrics,
    events: EventBus,
    client: UpstreamClient,
    shutdown: Arc<Shutdown>,
}

impl Engine {
    /// Build an engine from validated configuration.
    pub fn from_config(config: BalancerConfig) -> Result<Arc<Self>, ConfigError> {
        let pools = config
            .pools
            .iter()
            .map(|p| Arc::new(ServerPool::from_config(p)))
            .collect();
        let rules = RuleEngine::from_configs(&config.rules)
            .map_err(|e| ConfigError::Validation(vec![e]))?;

        Ok(Arc::new(Self {
            pools: Arc::new(PoolSet::new(pools)),
            rules,
            limiter: RateLimiter::new(config.rate_limit.clone()),
            cache: ResponseCache::new(config.cache.clone()),
            metrics: LoadBalancerMetrics::new(),
            events: EventBus::default(),
            client: UpstreamClient::new(),
            shutdown: Arc::new(Shutdown::new()),
            config,
        }))
    }

    pub fn pools(&self) -> &Arc<PoolSet> {
        &self.pools
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn metrics(&self) -> &LoadBalancerMetrics {
        &self.metrics
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    pub fn shutdown_handle(&self) -> &Arc<Shutdown> {
        &self.shutdown
    }

    /// Subscribe to engine events (health transitions, admin changes,
    /// metric snapshots).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Spawn health probes, the idle sweep, and the snapshot task.
    pub fn start_background_tasks(self: Arc<Self>) {
        let monitor = HealthMonitor::new(
            self.pools.clone(),
            self.client.clone(),
            self.events.clone(),
        );
        monitor.spawn_all(&self.shutdown.sender());

        Self::spawn_sweep_task(self.clone());
        Self::spawn_snapshot_task(self);
    }

    fn spawn_sweep_task(engine: Arc<Engine>) {
        let mut shutdown_rx = engine.shutdown.subscribe();
        let period = Duration::from_secs(engine.config.rate_limit.sweep_idle_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.limiter.sweep_idle();
                        for pool in engine.pools.by_priority() {
                            pool.sessions().sweep();
                        }
                    }
                    _ = shutdown_rx.recv() => return,
                }
            }
        });
    }

    fn spawn_snapshot_task(engine: Arc<Engine>) {
        let mut shutdown_rx = engine.shutdown.subscribe();
        let period =
            Duration::from_secs(engine.config.observability.snapshot_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = engine.metrics_snapshot();
                        engine.events.publish(Event::MetricsSnapshot(snapshot));
                    }
                    _ = shutdown_rx.recv() => return,
                }
            }
        });
    }

    // --- Administrative surface ---

    /// Add (or replace) a pool at runtime and start probing its backends.
    pub fn add_pool(&self, config: &PoolConfig) -> Result<(), String> {
        if config.backends.is_empty() {
            return Err(format!("pool {} has no backends", config.id));
        }
        let pool = Arc::new(ServerPool::from_config(config));
        self.pools.insert(pool.clone());

        let monitor = HealthMonitor::new(
            self.pools.clone(),
            self.client.clone(),
            self.events.clone(),
        );
        monitor.spawn_for_pool(&pool, &self.shutdown.sender());

        info!(pool = %config.id, "pool added");
        self.events.publish(Event::PoolAdded {
            pool: config.id.clone(),
        });
        Ok(())
    }

    /// Remove a pool by id. Its probe tasks exit on their next tick.
    pub fn remove_pool(&self, id: &str) -> bool {
        let removed = self.pools.remove(id).is_some();
        if removed {
            info!(pool = %id, "pool removed");
            self.events.publish(Event::PoolRemoved {
                pool: id.to_string(),
            });
        }
        removed
    }

    pub fn add_rule(&self, config: &RuleConfig) -> Result<(), String> {
        self.rules.add_rule(config)?;
        info!(rule = %config.id, "rule added");
        self.events.publish(Event::RuleAdded {
            rule: config.id.clone(),
        });
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let removed = self.rules.remove_rule(id);
        if removed {
            info!(rule = %id, "rule removed");
            self.events.publish(Event::RuleRemoved {
                rule: id.to_string(),
            });
        }
        removed
    }

    /// Take a backend out of rotation; in-flight requests finish.
    pub fn drain_backend(&self, id: &str) -> bool {
        match self.pools.find_backend(id) {
            Some((pool, backend)) => {
                backend.set_status(ServerStatus::Draining);
                info!(pool = %pool.id, backend = %id, "backend draining");
                true
            }
            None => false,
        }
    }

    /// Return a drained (or maintenance) backend to rotation.
    pub fn enable_backend(&self, id: &str) -> bool {
        match self.pools.find_backend(id) {
            Some((pool, backend)) => {
                backend.set_status(ServerStatus::Healthy);
                info!(pool = %pool.id, backend = %id, "backend enabled");
                true
            }
            None => false,
        }
    }

    /// Live per-backend state for snapshots and the admin API.
    pub fn backend_observations(&self) -> Vec<BackendObservation> {
        self.pools
            .by_priority()
            .iter()
            .flat_map(|pool| {
                pool.backends().iter().map(|b| BackendObservation {
                    id: b.id.clone(),
                    pool: pool.id.clone(),
                    status: b.status(),
                    active_connections: b.active_connections(),
                    ewma_response_time_ms: b.response_time_ms(),
                    error_rate: b.error_rate(),
                })
            })
            .collect()
    }

    /// Aggregate metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.cache.hit_rate(), &self.backend_observations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        Algorithm, BackendConfig, ConditionField, ConditionOperator, Protocol,
        RuleActionConfig, RuleConditionConfig,
    };

    fn pool_config(id: &str) -> PoolConfig {
        PoolConfig {
            id: id.to_string(),
            priority: 0,
            enabled: true,
            algorithm: Algorithm::RoundRobin,
            backends: vec![BackendConfig {
                id: format!("{}-1", id),
                name: None,
                host: "127.0.0.1".to_string(),
                port: 3000,
                protocol: Protocol::Http,
                weight: 1,
                backup: false,
                max_connections: 10,
                insecure_skip_verify: false,
            }],
            weight_overrides: Default::default(),
            sticky: Default::default(),
            health_check: crate::config::schema::HealthCheckConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_pool_admin_roundtrip() {
        let engine = Engine::from_config(BalancerConfig::default()).unwrap();
        let mut events = engine.subscribe();

        engine.add_pool(&pool_config("web")).unwrap();
        assert!(engine.pools().get("web").is_some());
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PoolAdded { .. }
        ));

        assert!(engine.remove_pool("web"));
        assert!(!engine.remove_pool("web"));
        assert!(engine.pools().get("web").is_none());
    }

    #[tokio::test]
    async fn test_drain_and_enable() {
        let engine = Engine::from_config(BalancerConfig {
            pools: vec![pool_config("web")],
            ..Default::default()
        })
        .unwrap();

        assert!(engine.drain_backend("web-1"));
        let (_, backend) = engine.pools().find_backend("web-1").unwrap();
        assert_eq!(backend.status(), ServerStatus::Draining);
        assert!(!backend.is_eligible());

        assert!(engine.enable_backend("web-1"));
        assert!(backend.is_eligible());

        assert!(!engine.drain_backend("ghost"));
    }

    #[tokio::test]
    async fn test_rule_admin_roundtrip() {
        let engine = Engine::from_config(BalancerConfig::default()).unwrap();
        let rule = RuleConfig {
            id: "block".to_string(),
            priority: 0,
            enabled: true,
            condition: RuleConditionConfig {
                field: ConditionField::Path,
                header_name: None,
                operator: ConditionOperator::StartsWith,
                value: Some("/internal".to_string()),
                values: Vec::new(),
                case_insensitive: false,
            },
            action: RuleActionConfig::Reject {
                status: 403,
                message: "Forbidden".to_string(),
            },
        };

        engine.add_rule(&rule).unwrap();
        assert_eq!(engine.rules().list().len(), 1);
        assert!(engine.remove_rule("block"));
        assert!(engine.rules().list().is_empty());
    }
}
