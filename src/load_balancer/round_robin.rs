//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// Round-robin selector.
/// Stores an internal cursor to rotate through the eligible set, so k
/// candidates each receive an equal share of N consecutive selections.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        _ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}
