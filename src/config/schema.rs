//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! balancer. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the load balancer engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Backend pools, tried in ascending priority order.
    pub pools: Vec<PoolConfig>,

    /// Routing rules evaluated before pool selection.
    pub rules: Vec<RuleConfig>,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Response compression configuration.
    pub compression: CompressionConfig,

    /// Upstream forwarding configuration (timeouts, retry pacing).
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS termination.
    pub tls: Option<TlsConfig>,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// TLS termination for the inbound listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Attach a Strict-Transport-Security header to responses.
    #[serde(default)]
    pub hsts: bool,
}

/// Selection algorithm for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    IpHash,
    Weighted,
    LeastResponseTime,
    ResourceBased,
}

/// A named, prioritized group of backend servers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Unique pool identifier.
    pub id: String,

    /// Pools are tried in ascending priority order (lower = preferred).
    #[serde(default)]
    pub priority: u32,

    /// Disabled pools are skipped during selection.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Selection algorithm, fixed at load time.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Backend servers owned by this pool.
    pub backends: Vec<BackendConfig>,

    /// Per-backend weight overrides, keyed by backend id.
    #[serde(default)]
    pub weight_overrides: HashMap<String, u32>,

    /// Sticky session settings for this pool.
    #[serde(default)]
    pub sticky: StickyConfig,

    /// Health check policy for this pool's backends.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

/// Backend wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub id: String,

    /// Human-readable name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Backend host (name or address).
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Protocol used to reach the backend.
    #[serde(default)]
    pub protocol: Protocol,

    /// Weight for weighted load balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Backup servers only receive traffic when no primary is healthy.
    #[serde(default)]
    pub backup: bool,

    /// Maximum concurrent connections to this backend.
    #[serde(default = "default_max_backend_conns")]
    pub max_connections: u32,

    /// Skip TLS certificate verification for https backends.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_max_backend_conns() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

/// Sticky session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StickyConfig {
    /// Enable session pinning for the pool.
    pub enabled: bool,

    /// Header carrying the session identifier.
    pub session_header: String,

    /// Mapping lifetime in seconds; refreshed on use.
    pub ttl_secs: u64,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_header: "x-session-id".to_string(),
            ttl_secs: 1800,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Delay before the first probe of a newly registered backend.
    pub grace_period_secs: u64,

    /// Hard timeout per probe in seconds.
    pub timeout_secs: u64,

    /// Path to probe.
    pub path: String,

    /// HTTP method for the probe.
    pub method: String,

    /// Consecutive failures before marking unhealthy.
    pub failure_threshold: u32,

    /// Status codes accepted as healthy. Empty means any 2xx.
    pub expected_statuses: Vec<u16>,

    /// Substring the probe body must contain, if set.
    pub body_substring: Option<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            grace_period_secs: 5,
            timeout_secs: 5,
            path: "/health".to_string(),
            method: "GET".to_string(),
            failure_threshold: 3,
            expected_statuses: Vec::new(),
            body_substring: None,
        }
    }
}

/// Attribute of the request a rule condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionField {
    Path,
    Header,
    Method,
    Ip,
}

/// Comparison applied by a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    InList,
}

/// A single rule condition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConditionConfig {
    /// Request attribute to inspect.
    pub field: ConditionField,

    /// Header name, required when `field = "header"`.
    #[serde(default)]
    pub header_name: Option<String>,

    /// Comparison operator.
    pub operator: ConditionOperator,

    /// Comparison operand for single-value operators.
    #[serde(default)]
    pub value: Option<String>,

    /// Operand set for the in-list operator.
    #[serde(default)]
    pub values: Vec<String>,

    /// Compare case-insensitively.
    #[serde(default)]
    pub case_insensitive: bool,
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleActionConfig {
    /// Bypass priority-ordered selection and target one pool directly.
    RouteToPool { pool: String },

    /// Short-circuit with a redirect.
    Redirect {
        location: String,
        #[serde(default = "default_redirect_status")]
        status: u16,
    },

    /// Short-circuit with a rejection.
    Reject {
        #[serde(default = "default_reject_status")]
        status: u16,
        #[serde(default = "default_reject_message")]
        message: String,
    },

    /// Mutate request headers in place, then continue normal processing.
    ModifyRequest {
        #[serde(default)]
        set_headers: HashMap<String, String>,
        #[serde(default)]
        remove_headers: Vec<String>,
    },
}

fn default_redirect_status() -> u16 {
    302
}

fn default_reject_status() -> u16 {
    403
}

fn default_reject_message() -> String {
    "Forbidden".to_string()
}

/// A routing rule: one condition, one action.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Unique rule identifier.
    pub id: String,

    /// Rules are evaluated in ascending priority order; first match wins.
    #[serde(default)]
    pub priority: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub condition: RuleConditionConfig,

    pub action: RuleActionConfig,
}

/// Source of the rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitKey {
    #[default]
    Ip,
    Header,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per key.
    pub requests_per_second: u32,

    /// Extra burst allowance on top of the sustained rate.
    pub burst_size: u32,

    /// What identifies a client for accounting purposes.
    pub key: RateLimitKey,

    /// Header carrying the key when `key = "header"`.
    pub header_name: String,

    /// Keys admitted unconditionally.
    pub allowlist: Vec<String>,

    /// Keys denied unconditionally.
    pub denylist: Vec<String>,

    /// Buckets idle longer than this are swept to bound memory.
    pub sweep_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
            key: RateLimitKey::Ip,
            header_name: "x-api-key".to_string(),
            allowlist: Vec::new(),
            denylist: Vec::new(),
            sweep_idle_secs: 300,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching.
    pub enabled: bool,

    /// Entry lifetime in seconds.
    pub ttl_secs: u64,

    /// Aggregate cached-bytes ceiling.
    pub max_size_bytes: u64,

    /// Headers folded into the cache key.
    pub vary_headers: Vec<String>,

    /// If non-empty, only these path prefixes are cacheable.
    pub include_paths: Vec<String>,

    /// Path prefixes never cached; takes precedence over includes.
    pub exclude_paths: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 60,
            max_size_bytes: 64 * 1024 * 1024,
            vary_headers: vec!["accept-encoding".to_string()],
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable gzip compression of upstream responses.
    pub enabled: bool,

    /// Bodies smaller than this are left uncompressed.
    pub min_size_bytes: usize,

    /// Content types eligible for compression (prefix match).
    pub content_types: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_size_bytes: 1024,
            content_types: vec![
                "text/".to_string(),
                "application/json".to_string(),
                "application/javascript".to_string(),
                "application/xml".to_string(),
            ],
        }
    }
}

/// Upstream forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Hard deadline per forwarding attempt in seconds.
    pub timeout_secs: u64,

    /// Base delay before a retry in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Ceiling for the retry delay in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON logs instead of the human-readable format.
    pub log_json: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Interval between metrics snapshots on the event bus, in seconds.
    pub snapshot_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            snapshot_interval_secs: 10,
        }
    }
}

/// Administrative API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API server.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

impl BackendConfig {
    /// Base URL for forwarding to this backend.
    pub fn base_url(&self) -> String {
        let scheme = match self.protocol {
            Protocol::Http => "http",
            Protocol::Https => "https",
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
