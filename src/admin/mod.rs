//! Administrative API.
//!
//! Exposes the engine's in-process admin surface over HTTP on a dedicated
//! listener: pool and rule management, backend drain/enable, and metric
//! snapshots. Protected by a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::Engine;
use crate::lifecycle::Shutdown;
use auth::{admin_auth_middleware, AdminAuth};
use handlers::*;

/// State shared by all admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<Engine>,
}

pub fn admin_router(engine: Arc<Engine>) -> Router {
    let auth = AdminAuth {
        api_key: engine.config.admin.api_key.clone(),
    };
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/pools", get(list_pools).post(add_pool))
        .route("/admin/pools/{id}", axum::routing::delete(remove_pool))
        .route("/admin/rules", get(list_rules).post(add_rule))
        .route("/admin/rules/{id}", axum::routing::delete(remove_rule))
        .route("/admin/backends/{id}/drain", post(drain_backend))
        .route("/admin/backends/{id}/enable", post(enable_backend))
        .route("/admin/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(auth, admin_auth_middleware))
        .with_state(AdminState { engine })
}

/// Serve the admin API until shutdown.
pub async fn run_admin_server(
    engine: Arc<Engine>,
    shutdown: Arc<Shutdown>,
) -> Result<(), std::io::Error> {
    let bind_address = engine.config.admin.bind_address.clone();
    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %listener.local_addr()?, "admin API listening");

    let router = admin_router(engine);
    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}
