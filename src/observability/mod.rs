//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request path → metrics.rs (record points, atomics + metrics macros)
//!     → Prometheus exporter (scrape endpoint)
//!     → snapshot task → MetricsSnapshot event on the bus
//! Startup → logging.rs (tracing subscriber init)
//! ```
//!
//! # Design Decisions
//! - Record points are atomic; no locks on the hot path
//! - Derived gauges (throughput, averages, hit rate) computed at
//!   snapshot time, not per request

pub mod logging;
pub mod metrics;
