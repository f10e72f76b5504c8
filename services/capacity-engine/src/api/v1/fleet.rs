//! Fleet event intake and alert history.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fleetcap_events::{EventEnvelope, FleetEvent};
use fleetcap_id::EventSeq;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use super::ListResponse;
use crate::api::error::ApiError;
use crate::monitor::RECENT_ALERTS;
use crate::reconciler::ScalingError;
use crate::state::AppState;

const DEFAULT_ALERT_LIMIT: usize = 50;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fleet/events", post(submit_event))
        .route("/fleet/checkpoint", get(checkpoint))
        .route("/alerts/recent", get(recent_alerts))
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub seq: EventSeq,
    pub event_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub last_seq: EventSeq,
}

#[derive(Debug, Deserialize)]
pub struct RecentAlertsQuery {
    pub limit: Option<usize>,
}

/// Queue a fleet event for the reconciler. Application is asynchronous;
/// outcomes are logged by the reconciler worker.
async fn submit_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope<FleetEvent>>,
) -> Result<impl IntoResponse, ApiError> {
    // Zero would read as already processed and be dropped by the worker.
    if envelope.seq == EventSeq::ZERO {
        return Err(ScalingError::InvalidSequence(envelope.seq).into());
    }

    let accepted = AcceptedResponse {
        seq: envelope.seq,
        event_type: envelope.payload.event_type(),
    };

    match state.fleet_events().try_send(envelope) {
        Ok(()) => {
            debug!(seq = %accepted.seq, event_type = accepted.event_type, "Fleet event queued");
            Ok((StatusCode::ACCEPTED, Json(accepted)))
        }
        Err(TrySendError::Full(_)) => Err(ApiError::service_unavailable(
            "reconciler_busy",
            "fleet event queue is full",
        )),
        Err(TrySendError::Closed(_)) => Err(ApiError::service_unavailable(
            "reconciler_unavailable",
            "reconciler is not running",
        )),
    }
}

async fn checkpoint(State(state): State<AppState>) -> impl IntoResponse {
    Json(CheckpointResponse {
        last_seq: state.engine().reconciler().checkpoint().await,
    })
}

async fn recent_alerts(
    State(state): State<AppState>,
    Query(query): Query<RecentAlertsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT).min(RECENT_ALERTS);
    Json(ListResponse::from(state.engine().monitor().recent(limit).await))
}
