//! Server API endpoints.
//!
//! Used by fleet orchestration tooling to register, move, drain and retire
//! baremetal servers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fleetcap_events::{PoolName, ServerSpec, ServerStatus};
use fleetcap_id::ServerId;
use serde::Deserialize;

use super::{parse_pool, ListResponse};
use crate::api::error::ApiError;
use crate::registry::ServerFilter;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/servers", post(register_server).get(list_servers))
        .route("/servers/{server_id}", get(get_server).delete(remove_server))
        .route("/servers/{server_id}/pool", post(assign_pool))
        .route("/servers/{server_id}/drain", post(drain_server))
        .route("/servers/{server_id}/activate", post(activate_server))
}

#[derive(Debug, Deserialize)]
pub struct ListServersQuery {
    pub pool: Option<PoolName>,
    pub status: Option<ServerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AssignPoolRequest {
    pub pool: String,

    /// Operator affirms no workload depends on this server.
    #[serde(default)]
    pub drained: bool,
}

async fn register_server(
    State(state): State<AppState>,
    Json(spec): Json<ServerSpec>,
) -> Result<impl IntoResponse, ApiError> {
    let server = state.engine().registry().register_server(spec).await?;
    Ok((StatusCode::CREATED, Json(server)))
}

async fn list_servers(
    State(state): State<AppState>,
    Query(query): Query<ListServersQuery>,
) -> impl IntoResponse {
    let filter = ServerFilter {
        pool: query.pool,
        status: query.status,
    };
    let servers = state.engine().registry().list(filter).await;
    Json(ListResponse::from(servers))
}

async fn get_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ServerId::parse(&server_id)?;
    let server = state.engine().registry().get(&id).await?;
    Ok(Json(server))
}

async fn remove_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ServerId::parse(&server_id)?;
    let server = state.engine().registry().remove_server(id).await?;
    Ok(Json(server))
}

async fn assign_pool(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Json(req): Json<AssignPoolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ServerId::parse(&server_id)?;
    let pool = parse_pool(&req.pool)?;
    let server = state
        .engine()
        .registry()
        .move_server(id, None, pool, req.drained)
        .await?;
    Ok(Json(server))
}

async fn drain_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ServerId::parse(&server_id)?;
    let server = state.engine().registry().drain_server(id).await?;
    Ok(Json(server))
}

async fn activate_server(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ServerId::parse(&server_id)?;
    let server = state.engine().registry().activate_server(id).await?;
    Ok(Json(server))
}
