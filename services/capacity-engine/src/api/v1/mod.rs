//! API v1 routes.

mod allocations;
mod fleet;
mod pools;
mod servers;

use axum::Router;
use fleetcap_events::PoolName;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(servers::routes())
        .merge(pools::routes())
        .merge(allocations::routes())
        .merge(fleet::routes())
}

/// Envelope for list responses.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

fn parse_pool(raw: &str) -> Result<PoolName, ApiError> {
    Ok(raw.parse()?)
}
