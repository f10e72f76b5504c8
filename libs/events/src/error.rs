//! Error types for event vocabulary parsing.

use thiserror::Error;

/// Errors that can occur when decoding event vocabulary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The pool name is not one of `k8s`, `vm`, `unassigned`.
    #[error("unknown pool: {0}")]
    UnknownPool(String),

    /// The resource dimension name is not recognised.
    #[error("unknown resource dimension: {0}")]
    UnknownDimension(String),

    /// The payload could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
