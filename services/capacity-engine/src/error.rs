//! Engine-wide error type.

use fleetcap_events::EventError;
use fleetcap_id::IdError;
use fleetcap_reconcile::ReconcileError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::reconciler::ScalingError;
use crate::registry::RegistryError;

/// Any error the engine can surface to an adapter.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Scaling(#[from] ScalingError),

    #[error(transparent)]
    Thresholds(#[from] ReconcileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Event(#[from] EventError),
}

impl EngineError {
    /// Whether the same call may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
