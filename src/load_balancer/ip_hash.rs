//! IP-hash selection strategy.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::load_balancer::backend::BackendServer;
use crate::load_balancer::{SelectionContext, Strategy};

/// IP-hash selector.
/// Hashes the client IP modulo the eligible-candidate count, so a client
/// keeps hitting the same backend while pool membership is stable.
/// Membership changes reshard the mapping; that is accepted behavior.
#[derive(Debug, Default)]
pub struct IpHash;

impl IpHash {
    pub fn new() -> Self {
        Self
    }

    fn hash_key(key: &[u8]) -> u64 {
        let mut hasher = ahash::AHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl Strategy for IpHash {
    fn pick(
        &self,
        candidates: &[Arc<BackendServer>],
        ctx: &SelectionContext,
    ) -> Option<Arc<BackendServer>> {
        if candidates.is_empty() {
            return None;
        }
        let index = match ctx.client_ip {
            Some(ip) => {
                let hash = Self::hash_key(ip.to_string().as_bytes());
                (hash as usize) % candidates.len()
            }
            // No client address available; fall back to the first candidate.
            None => 0,
        };
        Some(candidates[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, Protocol};
    use std::net::IpAddr;

    fn backend(id: &str) -> Arc<BackendServer> {
        Arc::new(BackendServer::from_config(&BackendConfig {
            id: id.to_string(),
            name: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: Protocol::Http,
            weight: 1,
            backup: false,
            max_connections: 100,
            insecure_skip_verify: false,
        }))
    }

    #[test]
    fn test_same_ip_same_backend() {
        let lb = IpHash::new();
        let candidates = vec![backend("a"), backend("b"), backend("c")];
        let ctx = SelectionContext {
            client_ip: Some("203.0.113.7".parse::<IpAddr>().unwrap()),
        };

        let first = lb.pick(&candidates, &ctx).unwrap();
        for _ in 0..20 {
            assert_eq!(lb.pick(&candidates, &ctx).unwrap().id, first.id);
        }
    }

    #[test]
    fn test_different_ips_spread() {
        let lb = IpHash::new();
        let candidates = vec![backend("a"), backend("b"), backend("c"), backend("d")];

        let mut seen = std::collections::HashSet::new();
        for i in 0..64u8 {
            let ctx = SelectionContext {
                client_ip: Some(IpAddr::from([10, 0, i, 1])),
            };
            seen.insert(lb.pick(&candidates, &ctx).unwrap().id.clone());
        }
        // 64 distinct IPs should land on more than one backend.
        assert!(seen.len() > 1);
    }
}
