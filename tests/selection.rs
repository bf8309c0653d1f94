//! Selection-algorithm properties exercised through pools, and the
//! health state machine driven the way the prober drives it.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::HeaderMap;

use relayd::config::schema::{Algorithm, StickyConfig};
use relayd::load_balancer::backend::{BackendServer, ConnectionGuard, ServerStatus};
use relayd::load_balancer::pool::ServerPool;
use relayd::load_balancer::SelectionContext;

mod common;

fn make_pool(algorithm: Algorithm, backend_ids: &[&str]) -> ServerPool {
    let backends = backend_ids
        .iter()
        .map(|id| common::backend(id, "127.0.0.1:9".parse().unwrap()))
        .collect();
    let mut config = common::pool("p", algorithm, backends);
    config.backends.iter_mut().for_each(|b| b.max_connections = 10_000);
    ServerPool::from_config(&config)
}

fn select_id(pool: &ServerPool, ctx: &SelectionContext, headers: &HeaderMap) -> String {
    pool.select(ctx, headers, &[]).unwrap().id.clone()
}

#[test]
fn test_round_robin_fairness_over_many_selections() {
    let pool = make_pool(Algorithm::RoundRobin, &["a", "b", "c"]);
    let ctx = SelectionContext::default();
    let headers = HeaderMap::new();

    let n = 4001; // deliberately not divisible by 3
    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..n {
        *counts.entry(select_id(&pool, &ctx, &headers)).or_default() += 1;
    }
    // Each server gets floor(N/k) or ceil(N/k).
    for (id, count) in &counts {
        assert!(
            *count == 1333 || *count == 1334,
            "server {} selected {} times",
            id,
            count
        );
    }
}

#[test]
fn test_least_connections_avoids_loaded_server() {
    let pool = make_pool(Algorithm::LeastConnections, &["a", "b", "c"]);
    let ctx = SelectionContext::default();
    let headers = HeaderMap::new();

    // Hold connections open on "a" so it stays the heaviest.
    let a = pool.backend_by_id("a").unwrap();
    let _held: Vec<_> = (0..5).filter_map(|_| ConnectionGuard::acquire(&a)).collect();

    for _ in 0..20 {
        let picked = select_id(&pool, &ctx, &headers);
        assert_ne!(picked, "a");
    }
}

#[test]
fn test_ip_hash_stable_for_same_client() {
    let pool = make_pool(Algorithm::IpHash, &["a", "b", "c", "d"]);
    let headers = HeaderMap::new();
    let ctx = SelectionContext {
        client_ip: Some("198.51.100.23".parse().unwrap()),
    };

    let first = select_id(&pool, &ctx, &headers);
    for _ in 0..50 {
        assert_eq!(select_id(&pool, &ctx, &headers), first);
    }
}

#[test]
fn test_weighted_distribution_4000_trials() {
    let mut config = common::pool(
        "p",
        Algorithm::Weighted,
        vec![
            common::backend("a", "127.0.0.1:9".parse().unwrap()),
            common::backend("b", "127.0.0.1:9".parse().unwrap()),
        ],
    );
    config.backends[0].weight = 1;
    config.backends[1].weight = 3;
    config.backends.iter_mut().for_each(|b| b.max_connections = 10_000);
    let pool = ServerPool::from_config(&config);

    let ctx = SelectionContext::default();
    let headers = HeaderMap::new();
    let mut b_count = 0u32;
    for _ in 0..4000 {
        if select_id(&pool, &ctx, &headers) == "b" {
            b_count += 1;
        }
    }
    assert!(
        (2850..=3150).contains(&b_count),
        "b selected {} of 4000",
        b_count
    );
}

#[test]
fn test_health_state_machine_thresholds() {
    let backend = BackendServer::from_config(&common::backend(
        "probe-target",
        "127.0.0.1:9".parse().unwrap(),
    ));
    let threshold = 3;

    // Stays selectable below the threshold.
    assert!(!backend.mark_probe_failure(threshold));
    assert!(!backend.mark_probe_failure(threshold));
    assert_eq!(backend.status(), ServerStatus::Healthy);

    // Exactly one transition at the threshold, idempotent beyond it.
    assert!(backend.mark_probe_failure(threshold));
    assert_eq!(backend.status(), ServerStatus::Unhealthy);
    assert!(!backend.mark_probe_failure(threshold));
    assert!(!backend.mark_probe_failure(threshold));

    // A single success restores service.
    assert!(backend.mark_probe_success());
    assert_eq!(backend.status(), ServerStatus::Healthy);
    assert_eq!(backend.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_sticky_pin_expires_after_ttl() {
    let mut config = common::pool(
        "p",
        Algorithm::RoundRobin,
        vec![
            common::backend("a", "127.0.0.1:9".parse().unwrap()),
            common::backend("b", "127.0.0.1:9".parse().unwrap()),
        ],
    );
    config.sticky = StickyConfig {
        enabled: true,
        session_header: "x-session-id".to_string(),
        ttl_secs: 1,
    };
    let pool = ServerPool::from_config(&config);
    let ctx = SelectionContext::default();
    let mut headers = HeaderMap::new();
    headers.insert("x-session-id", "sess-9".parse().unwrap());

    let pinned = select_id(&pool, &ctx, &headers);
    for _ in 0..5 {
        assert_eq!(select_id(&pool, &ctx, &headers), pinned);
    }

    // Past the TTL the pin is gone; round-robin resumes and re-pins.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pool.sessions().sweep(), 1);
    let repinned = select_id(&pool, &ctx, &headers);
    for _ in 0..5 {
        assert_eq!(select_id(&pool, &ctx, &headers), repinned);
    }
}
