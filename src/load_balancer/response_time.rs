//! Least-response-time selection strategy.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// Least-response-time selector.
/// Picks the candidate with the lowest smoothed response time. Servers with
/// no samples yet report 0.0 and are therefore tried first.
#[derive(Debug, Default)]
pub struct LeastResponseTime;

impl LeastResponseTime {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastResponseTime {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        _ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.response_time_ms()
                    .partial_cmp(&b.response_time_ms())
                    .unwrap_or(Ordering::Equal)
            })
            .cloned()
    }
}
