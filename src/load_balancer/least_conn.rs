//! Least-connections selection strategy.

use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// Least-connections selector.
/// Picks the candidate with the fewest active connections; ties go to the
/// first in list order.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnections {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        _ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        candidates
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
    }
}
