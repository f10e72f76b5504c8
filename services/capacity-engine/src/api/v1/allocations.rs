//! Allocation API endpoints.
//!
//! Called by the provisioning workflow before creating a VM or scheduling
//! Kubernetes workloads, and again on teardown.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fleetcap_events::Capacity;
use fleetcap_id::AllocationId;
use serde::Deserialize;

use super::{parse_pool, ListResponse};
use crate::api::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/pools/{pool}/allocations",
            post(reserve).get(list_allocations),
        )
        .route(
            "/allocations/{allocation_id}",
            get(get_allocation).delete(release),
        )
}

/// Resources to reserve. Omitted dimensions are zero.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub workload_id: String,
    #[serde(default)]
    pub cpu_cores: u64,
    #[serde(default)]
    pub memory_gb: u64,
    #[serde(default)]
    pub storage_gb: u64,
    #[serde(default)]
    pub iops: u64,
}

async fn reserve(
    State(state): State<AppState>,
    Path(pool): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = parse_pool(&pool)?;
    let request = Capacity::new(req.cpu_cores, req.memory_gb, req.storage_gb, req.iops);
    let allocation = state
        .engine()
        .ledger()
        .reserve(pool, &req.workload_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(allocation)))
}

async fn list_allocations(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = parse_pool(&pool)?;
    let allocations = state.engine().ledger().allocations(pool).await;
    Ok(Json(ListResponse::from(allocations)))
}

async fn get_allocation(
    State(state): State<AppState>,
    Path(allocation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = AllocationId::parse(&allocation_id)?;
    let allocation = state.engine().ledger().get(id).await?;
    Ok(Json(allocation))
}

/// Release is best-effort cleanup: unknown or already released ids are
/// still 204.
async fn release(
    State(state): State<AppState>,
    Path(allocation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = AllocationId::parse(&allocation_id)?;
    state.engine().ledger().release(id).await;
    Ok(StatusCode::NO_CONTENT)
}
