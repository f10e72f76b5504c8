//! Registry error types.

use fleetcap_events::PoolName;
use fleetcap_id::ServerId;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by [`super::PoolRegistry`] mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A server with the same id or hostname is already registered.
    #[error("duplicate server: {field} '{value}' already registered")]
    DuplicateServer { field: &'static str, value: String },

    #[error("server not found: {0}")]
    ServerNotFound(ServerId),

    /// The move or status change does not satisfy the drain precondition.
    #[error("invalid pool transition for {server_id} ({from} -> {to}): {reason}")]
    InvalidPoolTransition {
        server_id: ServerId,
        from: PoolName,
        to: PoolName,
        reason: String,
    },

    /// The fleet already holds the configured maximum of live servers.
    #[error("fleet limit reached: {limit} servers")]
    FleetLimitReached { limit: usize },

    #[error("invalid server spec: {0}")]
    InvalidSpec(String),
}
