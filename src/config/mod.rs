//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; runtime changes go through the
//!   admin API, not file reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    Algorithm, BackendConfig, BalancerConfig, CacheConfig, CompressionConfig, ConditionField,
    ConditionOperator, HealthCheckConfig, ListenerConfig, PoolConfig, Protocol, RateLimitConfig,
    RateLimitKey, RuleActionConfig, RuleConditionConfig, RuleConfig, StickyConfig, UpstreamConfig,
};
