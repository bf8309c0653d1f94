//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher → pool set (ascending priority)
//!     → pool.rs (snapshot eligible backends)
//!     → sticky.rs (session pin lookup, overrides algorithm)
//!     → Apply selection strategy:
//!         - round_robin.rs (rotation cursor)
//!         - least_conn.rs (fewest active connections)
//!         - ip_hash.rs (client IP → stable index)
//!         - weighted.rs (random, probability ∝ weight)
//!         - response_time.rs (lowest EWMA latency)
//!         - resource.rs (composite connections/latency score)
//!     → backend.rs (acquire connection guard)
//!     → Return backend connection or not-available
//! ```
//!
//! # Design Decisions
//! - One strategy instance per pool, chosen at configuration time
//! - Eligibility is snapshotted once per selection (point-in-time view)
//! - Backup servers considered only when no primary is eligible
//! - Sticky sessions and admin calls reference backends by id, not pointer

pub mod backend;
pub mod ip_hash;
pub mod least_conn;
pub mod pool;
pub mod resource;
pub mod response_time;
pub mod round_robin;
pub mod sticky;
pub mod weighted;

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::schema::Algorithm;
use backend::BackendServer;

/// Per-request inputs a strategy may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionContext {
    /// Client address, used by ip-hash.
    pub client_ip: Option<IpAddr>,
}

/// A backend selection strategy.
///
/// `candidates` is the point-in-time snapshot of eligible servers taken by
/// the pool; implementations never re-check health themselves.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>>;
}

/// Build the strategy instance for a configured algorithm.
/// Weight overrides only affect the weighted strategy.
pub fn strategy_for(
    algorithm: Algorithm,
    weight_overrides: &std::collections::HashMap<String, u32>,
) -> Box<dyn Strategy> {
    match algorithm {
        Algorithm::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Algorithm::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Algorithm::IpHash => Box::new(ip_hash::IpHash::new()),
        Algorithm::Weighted => Box::new(weighted::WeightedRandom::new(weight_overrides.clone())),
        Algorithm::LeastResponseTime => Box::new(response_time::LeastResponseTime::new()),
        Algorithm::ResourceBased => Box::new(resource::ResourceBased::new()),
    }
}
