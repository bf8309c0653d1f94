//! Rule compilation and matching.
//!
//! # Responsibilities
//! - Compile a rule's condition once (regex build, case folding)
//! - Match one request attribute against the compiled condition
//!
//! # Design Decisions
//! - Case-insensitive matching folds the operand at compile time and the
//!   subject at match time
//! - An absent attribute (missing header, unknown client IP) never matches

use std::collections::HashMap;
use std::net::IpAddr;

use axum::http::{HeaderMap, Method};

use crate::config::schema::{
    ConditionField, ConditionOperator, RuleActionConfig, RuleConfig,
};

/// Request attributes a rule can inspect.
#[derive(Debug)]
pub struct RuleInput<'a> {
    pub path: &'a str,
    pub method: &'a Method,
    pub client_ip: Option<IpAddr>,
    pub headers: &'a HeaderMap,
}

/// Comparison with pre-folded operands.
#[derive(Debug)]
enum CompiledOperator {
    Equals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regex(regex::Regex),
    InList(Vec<String>),
}

#[derive(Debug)]
struct CompiledCondition {
    field: ConditionField,
    header_name: Option<String>,
    operator: CompiledOperator,
    case_insensitive: bool,
}

/// A rule ready for evaluation.
#[derive(Debug)]
pub struct CompiledRule {
    pub id: String,
    pub priority: u32,
    pub enabled: bool,
    condition: CompiledCondition,
    pub action: RuleActionConfig,
    /// Original definition, kept for listings.
    pub source: RuleConfig,
}

impl CompiledRule {
    /// Compile a configured rule. Fails on invalid regex or a header
    /// condition without a header name.
    pub fn compile(config: &RuleConfig) -> Result<Self, String> {
        let cond = &config.condition;
        if cond.field == ConditionField::Header && cond.header_name.is_none() {
            return Err(format!("rule {}: header condition without header_name", config.id));
        }

        let fold = |s: &str| {
            if cond.case_insensitive {
                s.to_ascii_lowercase()
            } else {
                s.to_string()
            }
        };

        let operand = || {
            cond.value
                .clone()
                .ok_or_else(|| format!("rule {}: condition missing value", config.id))
        };

        let operator = match cond.operator {
            ConditionOperator::Equals => CompiledOperator::Equals(fold(&operand()?)),
            ConditionOperator::Contains => CompiledOperator::Contains(fold(&operand()?)),
            ConditionOperator::StartsWith => CompiledOperator::StartsWith(fold(&operand()?)),
            ConditionOperator::EndsWith => CompiledOperator::EndsWith(fold(&operand()?)),
            ConditionOperator::Regex => {
                let pattern = operand()?;
                let pattern = if cond.case_insensitive {
                    format!("(?i){}", pattern)
                } else {
                    pattern
                };
                let regex = regex::Regex::new(&pattern)
                    .map_err(|e| format!("rule {}: invalid regex: {}", config.id, e))?;
                CompiledOperator::Regex(regex)
            }
            ConditionOperator::InList => {
                if cond.values.is_empty() {
                    return Err(format!("rule {}: in-list condition without values", config.id));
                }
                CompiledOperator::InList(cond.values.iter().map(|v| fold(v)).collect())
            }
        };

        Ok(Self {
            id: config.id.clone(),
            priority: config.priority,
            enabled: config.enabled,
            condition: CompiledCondition {
                field: cond.field,
                header_name: cond.header_name.clone(),
                operator,
                case_insensitive: cond.case_insensitive,
            },
            action: config.action.clone(),
            source: config.clone(),
        })
    }

    /// Evaluate the condition against a request.
    pub fn matches(&self, input: &RuleInput<'_>) -> bool {
        let subject = match self.condition.field {
            ConditionField::Path => Some(input.path.to_string()),
            ConditionField::Method => Some(input.method.as_str().to_string()),
            ConditionField::Ip => input.client_ip.map(|ip| ip.to_string()),
            ConditionField::Header => self
                .condition
                .header_name
                .as_deref()
                .and_then(|name| input.headers.get(name))
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
        };
        let Some(subject) = subject else {
            return false;
        };
        let subject = if self.condition.case_insensitive {
            subject.to_ascii_lowercase()
        } else {
            subject
        };

        match &self.condition.operator {
            CompiledOperator::Equals(v) => subject == *v,
            CompiledOperator::Contains(v) => subject.contains(v.as_str()),
            CompiledOperator::StartsWith(v) => subject.starts_with(v.as_str()),
            CompiledOperator::EndsWith(v) => subject.ends_with(v.as_str()),
            CompiledOperator::Regex(r) => r.is_match(&subject),
            CompiledOperator::InList(vs) => vs.iter().any(|v| *v == subject),
        }
    }
}

/// Apply a modify-request action to a header map.
pub fn apply_header_mutation(
    headers: &mut HeaderMap,
    set_headers: &HashMap<String, String>,
    remove_headers: &[String],
) {
    for name in remove_headers {
        headers.remove(name.as_str());
    }
    for (name, value) in set_headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
}
