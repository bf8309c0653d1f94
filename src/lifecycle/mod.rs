//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build engine → Spawn background tasks
//!     → Bind listeners
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → probe tasks, sweeps, and the
//!     snapshot task exit → listeners drain → process exits
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task selects on it
//! - Listeners stop accepting first, in-flight requests drain

pub mod shutdown;

pub use shutdown::Shutdown;
