//! HTTP data plane.
//!
//! # Data Flow
//! ```text
//! listener (server.rs, optional TLS termination)
//!     → middleware (request id, trace, timeout, HSTS)
//!     → dispatch.rs (rules → admission → cache → selection → forward)
//!     → client.rs (pooled upstream connections)
//!     → response.rs (structured errors, compression)
//! ```

pub mod client;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use server::HttpServer;
