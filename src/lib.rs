//! relayd — an embeddable L4/L7 load balancer and reverse-proxy engine.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌────────────────────────────────────────────────┐
//!                       │                  LOAD BALANCER                  │
//!                       │                                                 │
//!   Client Request      │  ┌────────┐   ┌─────────┐   ┌──────────────┐   │
//!   ────────────────────┼─▶│  http  │──▶│ routing │──▶│ rate limiter │   │
//!                       │  │ server │   │  rules  │   │   + cache    │   │
//!                       │  └────────┘   └─────────┘   └──────┬───────┘   │
//!                       │                                     │           │
//!                       │                                     ▼           │
//!                       │                            ┌───────────────┐    │
//!                       │                            │ load_balancer │    │
//!                       │                            │ pools + algos │    │
//!                       │                            └──────┬────────┘    │
//!                       │                                    │            │
//!   Client Response     │  ┌──────────┐   ┌────────┐   ┌────▼───────┐    │
//!   ◀───────────────────┼──│ compress │◀──│ retry/ │◀──│  backend   │◀───┼── Backends
//!                       │  │ + cache  │   │failover│   │  forward   │    │
//!                       │  └──────────┘   └────────┘   └────────────┘    │
//!                       │                                                 │
//!                       │  ┌───────────────────────────────────────────┐  │
//!                       │  │           Cross-Cutting Concerns          │  │
//!                       │  │  config · health probes · observability   │  │
//!                       │  │  events · admin API · lifecycle           │  │
//!                       │  └───────────────────────────────────────────┘  │
//!                       └────────────────────────────────────────────────┘
//! ```
//!
//! The [`engine::Engine`] owns every shared structure and is the in-process
//! administrative surface; [`http::HttpServer`] is the data plane wrapped
//! around it.

// Core subsystems
pub mod config;
pub mod engine;
pub mod http;
pub mod routing;

// Traffic management
pub mod cache;
pub mod health;
pub mod load_balancer;
pub mod security;

// Cross-cutting concerns
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub mod admin;

pub use config::schema::BalancerConfig;
pub use engine::Engine;
pub use error::ProxyError;
pub use events::Event;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
