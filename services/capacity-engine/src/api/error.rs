use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use fleetcap_events::EventError;
use fleetcap_id::{IdError, RequestId};
use serde::Serialize;

use crate::error::EngineError;
use crate::ledger::LedgerError;
use crate::reconciler::ScalingError;
use crate::registry::RegistryError;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://fleetcap.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            request_id: RequestId::new().to_string(),
            retryable: false,
            details: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message);
        err.problem.retryable = true;
        err
    }

    pub fn retryable(mut self) -> Self {
        self.problem.retryable = true;
        self
    }

    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.problem.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::ServerNotFound(_) => Self::not_found("server_not_found", message),
            RegistryError::DuplicateServer { .. } => Self::conflict("duplicate_server", message),
            RegistryError::InvalidPoolTransition { .. } => {
                Self::conflict("invalid_pool_transition", message)
            }
            RegistryError::FleetLimitReached { .. } => {
                Self::conflict("fleet_limit_reached", message)
            }
            RegistryError::InvalidSpec(_) => Self::bad_request("invalid_request", message),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::InsufficientCapacity {
                dimension,
                requested,
                available,
                excess,
                ..
            } => Self::conflict("insufficient_capacity", message).with_details(vec![FieldError {
                field: dimension.to_string(),
                message: format!("requested {requested}, available {available}, short by {excess}"),
            }]),
            LedgerError::ConcurrentModification { .. } => {
                Self::conflict("concurrent_modification", message).retryable()
            }
            LedgerError::DuplicateAllocation { .. } => {
                Self::conflict("duplicate_allocation", message)
            }
            LedgerError::PoolNotAllocatable(_) => {
                Self::bad_request("pool_not_allocatable", message)
            }
            LedgerError::InvalidRequest(_) => Self::bad_request("invalid_request", message),
            LedgerError::AllocationNotFound(_) => {
                Self::not_found("allocation_not_found", message)
            }
        }
    }
}

impl From<ScalingError> for ApiError {
    fn from(err: ScalingError) -> Self {
        match err {
            ScalingError::Rejected { source, .. } => source.into(),
            ScalingError::InvalidSequence(_) => {
                Self::bad_request("invalid_request", err.to_string())
            }
        }
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::bad_request("invalid_id", err.to_string())
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        let message = err.to_string();
        match err {
            EventError::UnknownPool(_) => Self::bad_request("unknown_pool", message),
            EventError::UnknownDimension(_) | EventError::Serialization(_) => {
                Self::bad_request("invalid_request", message)
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Registry(e) => e.into(),
            EngineError::Ledger(e) => e.into(),
            EngineError::Scaling(e) => e.into(),
            EngineError::Id(e) => e.into(),
            EngineError::Event(e) => e.into(),
            EngineError::Thresholds(e) => Self::internal("internal_error", e.to_string()),
            EngineError::Config(e) => Self::internal("internal_error", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcap_events::{Dimension, PoolName};
    use fleetcap_id::ServerId;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                RegistryError::ServerNotFound(ServerId::new()).into(),
                StatusCode::NOT_FOUND,
                "server_not_found",
            ),
            (
                RegistryError::FleetLimitReached { limit: 200 }.into(),
                StatusCode::CONFLICT,
                "fleet_limit_reached",
            ),
            (
                LedgerError::PoolNotAllocatable(PoolName::Unassigned).into(),
                StatusCode::BAD_REQUEST,
                "pool_not_allocatable",
            ),
            (
                EventError::UnknownPool("gpu".to_string()).into(),
                StatusCode::BAD_REQUEST,
                "unknown_pool",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status, status);
            assert_eq!(err.problem.code, code);
            assert!(!err.problem.retryable);
        }
    }

    #[test]
    fn test_concurrent_modification_is_retryable() {
        let err: ApiError = EngineError::from(LedgerError::ConcurrentModification {
            pool: PoolName::Vm,
            attempts: 2,
        })
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.problem.retryable);
    }

    #[test]
    fn test_insufficient_capacity_details() {
        let err: ApiError = LedgerError::InsufficientCapacity {
            pool: PoolName::Vm,
            dimension: Dimension::CpuCores,
            requested: 4,
            available: 1,
            excess: 3,
        }
        .into();
        let details = err.problem.details.unwrap();
        assert_eq!(details[0].field, "cpu_cores");
        assert!(details[0].message.contains("short by 3"));
    }

    #[test]
    fn test_problem_json_content_type() {
        let response = ApiError::not_found("server_not_found", "nope").into_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
