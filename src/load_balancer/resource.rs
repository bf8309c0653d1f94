//! Resource-based selection strategy.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// Latency normalization ceiling: anything at or above this counts as fully
/// loaded on the latency axis.
const LATENCY_CEILING_MS: f64 = 5000.0;

/// Resource-based selector.
/// Scores each candidate by averaging connection headroom and latency
/// headroom; the highest score wins.
#[derive(Debug, Default)]
pub struct ResourceBased;

impl ResourceBased {
    pub fn new() -> Self {
        Self
    }

    fn score(backend: &BackendServer) -> f64 {
        let connection_headroom =
            1.0 - backend.active_connections() as f64 / backend.max_connections.max(1) as f64;
        let latency_headroom =
            (1.0 - backend.response_time_ms() / LATENCY_CEILING_MS).max(0.0);
        (connection_headroom + latency_headroom) / 2.0
    }
}

impl Strategy for ResourceBased {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        _ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        candidates
            .iter()
            .max_by(|a, b| {
                Self::score(a)
                    .partial_cmp(&Self::score(b))
                    .unwrap_or(Ordering::Equal)
            })
            .cloned()
    }
}
