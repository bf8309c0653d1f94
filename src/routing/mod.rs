//! Rule-based routing.
//!
//! # Data Flow
//! ```text
//! Request → engine.rs (rules in ascending priority, first match wins)
//!     → route-to-pool: bypass priority-ordered pool selection
//!     → redirect / reject: short-circuit, no backend contact
//!     → modify-request: mutate headers, fall through to normal processing
//!     → no match: normal processing
//! ```
//!
//! # Design Decisions
//! - Conditions compile once at load time (regex, case folding)
//! - Rules are immutable after load; changes go through add/remove
//! - One condition and one action per rule; composition is rule ordering

pub mod engine;
pub mod rule;

pub use engine::{RuleEngine, RuleOutcome};
pub use rule::{CompiledRule, RuleInput};
