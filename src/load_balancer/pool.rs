//! Server pools and the priority-ordered pool set.
//!
//! # Responsibilities
//! - Own each pool's backends, strategy instance, and session store
//! - Snapshot eligible backends and apply the pool's strategy
//! - Provide connection guards for selected backends
//! - Support runtime add/remove of pools and drain/enable of backends
//!
//! # Design Decisions
//! - Strategy chosen once at pool construction, never per request
//! - Pool iteration is ascending priority; first pool with a server wins
//! - Backup backends are a fallback tier within a pool, not a pool of
//!   their own
//! - The pool-set lock is held only to clone Arc handles, never across I/O

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::debug;

use crate::config::schema::{Algorithm, HealthCheckConfig, PoolConfig, StickyConfig};
use crate::load_balancer::backend::{BackendServer, ConnectionGuard};
use crate::load_balancer::sticky::SessionStore;
use crate::load_balancer::{strategy_for, SelectionContext, Strategy};

/// A named, prioritized, health-aware group of backends.
pub struct ServerPool {
    pub id: String,
    pub priority: u32,
    pub algorithm: Algorithm,
    enabled: AtomicBool,
    backends: Vec<Arc<BackendServer>>,
    strategy: Box<dyn Strategy>,
    pub sticky: StickyConfig,
    sessions: SessionStore,
    pub health_check: HealthCheckConfig,
}

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enabled", &self.is_enabled())
            .field("backends", &self.backends.len())
            .finish()
    }
}

impl ServerPool {
    pub fn from_config(config: &PoolConfig) -> Self {
        let backends = config
            .backends
            .iter()
            .map(|b| Arc::new(BackendServer::from_config(b)))
            .collect();

        Self {
            id: config.id.clone(),
            priority: config.priority,
            algorithm: config.algorithm,
            enabled: AtomicBool::new(config.enabled),
            backends,
            strategy: strategy_for(config.algorithm, &config.weight_overrides),
            sticky: config.sticky.clone(),
            sessions: SessionStore::new(Duration::from_secs(config.sticky.ttl_secs)),
            health_check: config.health_check.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn backends(&self) -> &[Arc<BackendServer>] {
        &self.backends
    }

    pub fn backend_by_id(&self, id: &str) -> Option<Arc<BackendServer>> {
        self.backends.iter().find(|b| b.id == id).cloned()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Point-in-time snapshot of selectable backends: eligible primaries,
    /// or eligible backups when no primary qualifies.
    fn eligible_snapshot(&self, exclude: &[String]) -> Vec<Arc<BackendServer>> {
        let keep = |b: &&Arc<BackendServer>| {
            b.is_eligible() && !exclude.iter().any(|id| *id == b.id)
        };
        let primaries: Vec<_> = self
            .backends
            .iter()
            .filter(|b| !b.backup)
            .filter(keep)
            .cloned()
            .collect();
        if !primaries.is_empty() {
            return primaries;
        }
        self.backends
            .iter()
            .filter(|b| b.backup)
            .filter(keep)
            .cloned()
            .collect()
    }

    /// Session id for this pool's sticky header, if stickiness is on.
    fn session_id<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        if !self.sticky.enabled {
            return None;
        }
        headers
            .get(self.sticky.session_header.as_str())
            .and_then(|v| v.to_str().ok())
    }

    /// Select a backend and acquire a connection slot on it.
    ///
    /// A live sticky pin overrides the strategy; otherwise the strategy's
    /// choice becomes the new pin when the request carries a session id.
    /// `exclude` lists backend ids already tried by this request.
    pub fn select(
        &self,
        ctx: &SelectionContext,
        headers: &HeaderMap,
        exclude: &[String],
    ) -> Option<ConnectionGuard> {
        let candidates = self.eligible_snapshot(exclude);
        if candidates.is_empty() {
            return None;
        }
        let session_id = self.session_id(headers);

        if self.sticky.enabled {
            if let Some(session) = session_id {
                if let Some(pinned_id) = self.sessions.lookup(session) {
                    if let Some(backend) =
                        candidates.iter().find(|b| b.id == pinned_id)
                    {
                        if let Some(guard) = ConnectionGuard::acquire(backend) {
                            return Some(guard);
                        }
                    }
                    // Pinned server no longer usable; fall through and re-pin.
                    self.sessions.forget(session);
                }
            }
        }

        let picked = self.strategy.pick(&candidates, ctx)?;
        let guard = ConnectionGuard::acquire(&picked)?;

        if self.sticky.enabled {
            if let Some(session) = session_id {
                self.sessions.record(session, &picked.id);
            }
        }
        Some(guard)
    }
}

/// Priority-ordered collection of pools, safe for concurrent use.
#[derive(Debug, Default)]
pub struct PoolSet {
    pools: RwLock<Vec<Arc<ServerPool>>>,
}

impl PoolSet {
    pub fn new(pools: Vec<Arc<ServerPool>>) -> Self {
        let mut pools = pools;
        pools.sort_by_key(|p| p.priority);
        Self {
            pools: RwLock::new(pools),
        }
    }

    /// Snapshot of pools in ascending priority order.
    pub fn by_priority(&self) -> Vec<Arc<ServerPool>> {
        self.pools.read().expect("pool set lock poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ServerPool>> {
        self.pools
            .read()
            .expect("pool set lock poisoned")
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Insert a pool, keeping priority order. Replaces any pool with the
    /// same id.
    pub fn insert(&self, pool: Arc<ServerPool>) {
        let mut pools = self.pools.write().expect("pool set lock poisoned");
        pools.retain(|p| p.id != pool.id);
        pools.push(pool);
        pools.sort_by_key(|p| p.priority);
    }

    /// Remove a pool by id. Returns the removed pool.
    pub fn remove(&self, id: &str) -> Option<Arc<ServerPool>> {
        let mut pools = self.pools.write().expect("pool set lock poisoned");
        let index = pools.iter().position(|p| p.id == id)?;
        Some(pools.remove(index))
    }

    /// Locate a backend by id across all pools.
    pub fn find_backend(&self, id: &str) -> Option<(Arc<ServerPool>, Arc<BackendServer>)> {
        let pools = self.pools.read().expect("pool set lock poisoned");
        for pool in pools.iter() {
            if let Some(backend) = pool.backend_by_id(id) {
                return Some((pool.clone(), backend));
            }
        }
        None
    }

    /// Select from enabled pools in ascending priority order; the first
    /// pool that yields a connection wins.
    pub fn select(
        &self,
        ctx: &SelectionContext,
        headers: &HeaderMap,
        exclude: &[String],
    ) -> Option<ConnectionGuard> {
        for pool in self.by_priority() {
            if !pool.is_enabled() {
                continue;
            }
            if let Some(guard) = pool.select(ctx, headers, exclude) {
                return Some(guard);
            }
            debug!(pool = %pool.id, "pool yielded no eligible backend");
        }
        None
    }
}
