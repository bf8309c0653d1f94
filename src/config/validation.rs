//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (rules reference existing pools)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//! - Reject duplicate pool/backend/rule identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the parsed config
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::{
    BalancerConfig, ConditionField, ConditionOperator, RuleActionConfig,
};

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let mut pool_ids = HashSet::new();
    for pool in &config.pools {
        if !pool_ids.insert(pool.id.as_str()) {
            errors.push(format!("duplicate pool id: {}", pool.id));
        }
        if pool.backends.is_empty() {
            errors.push(format!("pool {} has no backends", pool.id));
        }

        let mut backend_ids = HashSet::new();
        for backend in &pool.backends {
            if !backend_ids.insert(backend.id.as_str()) {
                errors.push(format!(
                    "duplicate backend id {} in pool {}",
                    backend.id, pool.id
                ));
            }
            if backend.host.is_empty() {
                errors.push(format!("backend {} has an empty host", backend.id));
            } else if url::Url::parse(&backend.base_url()).is_err() {
                errors.push(format!(
                    "backend {} has an unusable address: {}",
                    backend.id,
                    backend.base_url()
                ));
            }
            if backend.max_connections == 0 {
                errors.push(format!("backend {} has max_connections = 0", backend.id));
            }
        }

        for id in pool.weight_overrides.keys() {
            if !backend_ids.contains(id.as_str()) {
                errors.push(format!(
                    "weight override for unknown backend {} in pool {}",
                    id, pool.id
                ));
            }
        }

        let hc = &pool.health_check;
        if hc.enabled {
            if hc.interval_secs == 0 {
                errors.push(format!("pool {} health interval must be > 0", pool.id));
            }
            if hc.timeout_secs == 0 {
                errors.push(format!("pool {} health timeout must be > 0", pool.id));
            }
            if hc.failure_threshold == 0 {
                errors.push(format!("pool {} failure threshold must be > 0", pool.id));
            }
            if !hc.path.starts_with('/') {
                errors.push(format!(
                    "pool {} health path must start with '/': {}",
                    pool.id, hc.path
                ));
            }
        }

        if pool.sticky.enabled && pool.sticky.ttl_secs == 0 {
            errors.push(format!("pool {} sticky ttl must be > 0", pool.id));
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in &config.rules {
        if !rule_ids.insert(rule.id.as_str()) {
            errors.push(format!("duplicate rule id: {}", rule.id));
        }

        let cond = &rule.condition;
        if cond.field == ConditionField::Header && cond.header_name.is_none() {
            errors.push(format!("rule {} inspects a header but names none", rule.id));
        }
        match cond.operator {
            ConditionOperator::InList => {
                if cond.values.is_empty() {
                    errors.push(format!("rule {} in-list condition has no values", rule.id));
                }
            }
            ConditionOperator::Regex => match cond.value.as_deref() {
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        errors.push(format!("rule {} has an invalid regex: {}", rule.id, e));
                    }
                }
                None => errors.push(format!("rule {} regex condition has no pattern", rule.id)),
            },
            _ => {
                if cond.value.is_none() {
                    errors.push(format!("rule {} condition has no value", rule.id));
                }
            }
        }

        if let RuleActionConfig::RouteToPool { pool } = &rule.action {
            if !pool_ids.contains(pool.as_str()) {
                errors.push(format!("rule {} routes to unknown pool {}", rule.id, pool));
            }
        }
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push("rate_limit.requests_per_second must be > 0".to_string());
    }
    if config.cache.enabled {
        if config.cache.ttl_secs == 0 {
            errors.push("cache.ttl_secs must be > 0".to_string());
        }
        if config.cache.max_size_bytes == 0 {
            errors.push("cache.max_size_bytes must be > 0".to_string());
        }
    }
    if config.upstream.timeout_secs == 0 {
        errors.push("upstream.timeout_secs must be > 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn backend(id: &str) -> BackendConfig {
        BackendConfig {
            id: id.to_string(),
            name: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            protocol: Protocol::Http,
            weight: 1,
            backup: false,
            max_connections: 100,
            insecure_skip_verify: false,
        }
    }

    fn pool(id: &str) -> PoolConfig {
        PoolConfig {
            id: id.to_string(),
            priority: 0,
            enabled: true,
            algorithm: Algorithm::RoundRobin,
            backends: vec![backend("b1")],
            weight_overrides: Default::default(),
            sticky: Default::default(),
            health_check: Default::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = BalancerConfig {
            pools: vec![pool("web")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut p = pool("web");
        p.backends.clear();
        let config = BalancerConfig {
            pools: vec![p.clone(), p],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        // Duplicate pool id plus two empty-backend complaints.
        assert!(errors.len() >= 3);
    }

    #[test]
    fn test_rule_referencing_unknown_pool() {
        let config = BalancerConfig {
            pools: vec![pool("web")],
            rules: vec![RuleConfig {
                id: "r1".to_string(),
                priority: 0,
                enabled: true,
                condition: RuleConditionConfig {
                    field: ConditionField::Path,
                    header_name: None,
                    operator: ConditionOperator::StartsWith,
                    value: Some("/api".to_string()),
                    values: Vec::new(),
                    case_insensitive: false,
                },
                action: RuleActionConfig::RouteToPool {
                    pool: "missing".to_string(),
                },
            }],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unknown pool")));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let config = BalancerConfig {
            pools: vec![pool("web")],
            rules: vec![RuleConfig {
                id: "r1".to_string(),
                priority: 0,
                enabled: true,
                condition: RuleConditionConfig {
                    field: ConditionField::Path,
                    header_name: None,
                    operator: ConditionOperator::Regex,
                    value: Some("([unclosed".to_string()),
                    values: Vec::new(),
                    case_insensitive: false,
                },
                action: RuleActionConfig::Reject {
                    status: 403,
                    message: "no".to_string(),
                },
            }],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("invalid regex")));
    }
}
