//! Admin API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::schema::{Algorithm, PoolConfig, RuleConfig};
use crate::load_balancer::backend::ServerStatus;
use crate::observability::metrics::MetricsSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub pools: usize,
    pub rules: usize,
}

#[derive(Serialize)]
pub struct BackendSummary {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    pub active_connections: u32,
    pub ewma_response_time_ms: f64,
    pub error_rate: f64,
}

#[derive(Serialize)]
pub struct PoolSummary {
    pub id: String,
    pub priority: u32,
    pub enabled: bool,
    pub algorithm: Algorithm,
    pub backends: Vec<BackendSummary>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        pools: state.engine.pools().by_priority().len(),
        rules: state.engine.rules().list().len(),
    })
}

pub async fn list_pools(State(state): State<AdminState>) -> Json<Vec<PoolSummary>> {
    let pools = state
        .engine
        .pools()
        .by_priority()
        .iter()
        .map(|pool| PoolSummary {
            id: pool.id.clone(),
            priority: pool.priority,
            enabled: pool.is_enabled(),
            algorithm: pool.algorithm,
            backends: pool
                .backends()
                .iter()
                .map(|b| BackendSummary {
                    id: b.id.clone(),
                    name: b.name.clone(),
                    status: b.status(),
                    active_connections: b.active_connections(),
                    ewma_response_time_ms: b.response_time_ms(),
                    error_rate: b.error_rate(),
                })
                .collect(),
        })
        .collect();
    Json(pools)
}

pub async fn add_pool(
    State(state): State<AdminState>,
    Json(config): Json<PoolConfig>,
) -> impl IntoResponse {
    match state.engine.add_pool(&config) {
        Ok(()) => (StatusCode::CREATED, config.id).into_response(),
        Err(e) => (StatusCode::UNPROCESSABLE_ENTITY, e).into_response(),
    }
}

pub async fn remove_pool(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.engine.remove_pool(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn list_rules(State(state): State<AdminState>) -> Json<Vec<RuleConfig>> {
    Json(state.engine.rules().list())
}

pub async fn add_rule(
    State(state): State<AdminState>,
    Json(config): Json<RuleConfig>,
) -> impl IntoResponse {
    match state.engine.add_rule(&config) {
        Ok(()) => (StatusCode::CREATED, config.id).into_response(),
        Err(e) => (StatusCode::UNPROCESSABLE_ENTITY, e).into_response(),
    }
}

pub async fn remove_rule(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.engine.remove_rule(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn drain_backend(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.engine.drain_backend(&id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn enable_backend(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.engine.enable_backend(&id) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn get_metrics(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics_snapshot())
}
