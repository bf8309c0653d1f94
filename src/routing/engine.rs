//! Rule evaluation engine.
//!
//! # Responsibilities
//! - Hold the rule set in ascending priority order
//! - Evaluate a request: first enabled match wins
//! - Support runtime add/remove through the admin surface
//!
//! # Design Decisions
//! - modify-request executes in place and reports as non-terminal
//! - The rule lock is held only while scanning; actions run outside it

use std::sync::{Arc, RwLock};

use axum::http::HeaderMap;
use tracing::debug;

use crate::config::schema::{RuleActionConfig, RuleConfig};
use crate::routing::rule::{apply_header_mutation, CompiledRule, RuleInput};

/// Terminal result of rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Bypass priority-ordered selection, target this pool only.
    RouteToPool { rule_id: String, pool: String },
    /// Respond with a redirect, no backend contact.
    Redirect {
        rule_id: String,
        location: String,
        status: u16,
    },
    /// Respond with a rejection, no backend contact.
    Reject {
        rule_id: String,
        status: u16,
        message: String,
    },
}

/// Priority-ordered rule set.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Vec<Arc<CompiledRule>>>,
}

impl RuleEngine {
    /// Compile the configured rules. Fails on the first invalid rule.
    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self, String> {
        let mut rules = Vec::with_capacity(configs.len());
        for config in configs {
            rules.push(Arc::new(CompiledRule::compile(config)?));
        }
        rules.sort_by_key(|r| r.priority);
        Ok(Self {
            rules: RwLock::new(rules),
        })
    }

    /// Evaluate rules against the request. The first enabled match wins:
    /// a modify-request action mutates `headers` and evaluation stops with
    /// `None` (processing continues normally); terminal actions are
    /// returned to the dispatcher.
    pub fn evaluate(
        &self,
        path: &str,
        method: &axum::http::Method,
        client_ip: Option<std::net::IpAddr>,
        headers: &mut HeaderMap,
    ) -> Option<RuleOutcome> {
        let matched = {
            let input = RuleInput {
                path,
                method,
                client_ip,
                headers,
            };
            let rules = self.rules.read().expect("rule set lock poisoned");
            rules
                .iter()
                .filter(|r| r.enabled)
                .find(|r| r.matches(&input))
                .cloned()
        };
        let rule = matched?;
        debug!(rule = %rule.id, "rule matched");

        match &rule.action {
            RuleActionConfig::RouteToPool { pool } => Some(RuleOutcome::RouteToPool {
                rule_id: rule.id.clone(),
                pool: pool.clone(),
            }),
            RuleActionConfig::Redirect { location, status } => Some(RuleOutcome::Redirect {
                rule_id: rule.id.clone(),
                location: location.clone(),
                status: *status,
            }),
            RuleActionConfig::Reject { status, message } => Some(RuleOutcome::Reject {
                rule_id: rule.id.clone(),
                status: *status,
                message: message.clone(),
            }),
            RuleActionConfig::ModifyRequest {
                set_headers,
                remove_headers,
            } => {
                apply_header_mutation(headers, set_headers, remove_headers);
                None
            }
        }
    }

    /// Add (or replace) a rule at runtime.
    pub fn add_rule(&self, config: &RuleConfig) -> Result<(), String> {
        let compiled = Arc::new(CompiledRule::compile(config)?);
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        rules.retain(|r| r.id != compiled.id);
        rules.push(compiled);
        rules.sort_by_key(|r| r.priority);
        Ok(())
    }

    /// Remove a rule by id. Returns whether a rule was removed.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write().expect("rule set lock poisoned");
        let before = rules.len();
        rules.retain(|r| r.id != id);
        rules.len() != before
    }

    /// Current rule definitions in evaluation order.
    pub fn list(&self) -> Vec<RuleConfig> {
        self.rules
            .read()
            .expect("rule set lock poisoned")
            .iter()
            .map(|r| r.source.clone())
            .collect()
    }
}
