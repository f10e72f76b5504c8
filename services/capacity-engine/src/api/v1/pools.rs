//! Pool API endpoints.
//!
//! Read-only views for the dashboard: capacity, usage and alert levels.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::{parse_pool, ListResponse};
use crate::api::error::ApiError;
use crate::capacity::CapacitySnapshot;
use crate::registry::Server;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pools", get(fleet_summary))
        .route("/pools/{pool}", get(get_pool))
        .route("/pools/{pool}/usage", get(usage_report))
        .route("/pools/{pool}/alerts", get(alert_states))
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    #[serde(flatten)]
    pub snapshot: CapacitySnapshot,

    /// Live members, draining ones included.
    pub members: Vec<Server>,
}

async fn fleet_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine().aggregator().fleet_summary().await)
}

async fn get_pool(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = parse_pool(&pool)?;
    let engine = state.engine();
    let snapshot = engine.aggregator().snapshot(pool).await;
    let members = engine.registry().members(pool).await;
    Ok(Json(PoolResponse { snapshot, members }))
}

async fn usage_report(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = parse_pool(&pool)?;
    Ok(Json(state.engine().ledger().usage_report(pool).await))
}

async fn alert_states(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = parse_pool(&pool)?;
    let states = state.engine().monitor().states(pool).await;
    Ok(Json(ListResponse::from(states)))
}
