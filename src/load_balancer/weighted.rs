//! Weighted-random selection strategy.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// Weighted-random selector.
/// Each candidate is chosen with probability proportional to its effective
/// weight: the pool-level override when present, else the server default.
#[derive(Debug, Default)]
pub struct WeightedRandom {
    overrides: HashMap<String, u32>,
}

impl WeightedRandom {
    pub fn new(overrides: HashMap<String, u32>) -> Self {
        Self { overrides }
    }

    fn effective_weight(&self, backend: &BackendServer) -> u32 {
        self.overrides
            .get(&backend.id)
            .copied()
            .unwrap_or(backend.weight)
            .max(1)
    }
}

impl Strategy for WeightedRandom {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        _ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        if candidates.is_empty() {
            return None;
        }

        let total: u64 = candidates
            .iter()
            .map(|b| self.effective_weight(b) as u64)
            .sum();

        let mut roll = rand::thread_rng().gen_range(0..total);
        for backend in candidates {
            let weight = self.effective_weight(backend) as u64;
            if roll < weight {
                return Some(backend.clone());
            }
            roll -= weight;
        }
        // Unreachable with a correct total; keep the invariant cheap.
        candidates.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, Protocol};

    fn backend(id: &str, weight: u32) -> Arc<BackendServer> {
        Arc::new(BackendServer::from_config(&BackendConfig {
            id: id.to_string(),
            name: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: Protocol::Http,
            weight,
            backup: false,
            max_connections: 100,
            insecure_skip_verify: false,
        }))
    }

    #[test]
    fn test_distribution_tracks_weights() {
        let lb = WeightedRandom::default();
        let candidates = vec![backend("a", 1), backend("b", 3)];
        let ctx = SelectionContext::default();

        let mut b_hits = 0u32;
        for _ in 0..4000 {
            if lb.pick(&candidates, &ctx).unwrap().id == "b" {
                b_hits += 1;
            }
        }
        // Expectation is 3000; allow generous statistical slack.
        assert!(
            (2850..=3150).contains(&b_hits),
            "b selected {} times",
            b_hits
        );
    }

    #[test]
    fn test_override_beats_server_weight() {
        let mut overrides = HashMap::new();
        overrides.insert("a".to_string(), 0u32); // clamped to 1
        overrides.insert("b".to_string(), 99u32);
        let lb = WeightedRandom::new(overrides);
        let candidates = vec![backend("a", 50), backend("b", 1)];
        let ctx = SelectionContext::default();

        let mut b_hits = 0u32;
        for _ in 0..1000 {
            if lb.pick(&candidates, &ctx).unwrap().id == "b" {
                b_hits += 1;
            }
        }
        // b has 99/100 of the weight after overrides.
        assert!(b_hits > 900, "b selected {} times", b_hits);
    }
}
