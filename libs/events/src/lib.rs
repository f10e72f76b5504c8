//! # fleetcap-events
//!
//! Vocabulary shared between the capacity engine and its collaborators.
//!
//! ## Design Principles
//!
//! - Fleet lifecycle events are produced by orchestration tooling and carry a
//!   producer-assigned sequence so they can be applied exactly once
//! - Alert events are produced by the engine and consumed by the external
//!   notification relay; they are immutable records of a state transition
//! - Pools, resource dimensions and severities are closed enums with stable
//!   snake_case wire names
//!
//! ## Event Types
//!
//! - Fleet events (`server.added`, `server.removed`, `server.moved`,
//!   `server.draining`, `server.activated`)
//! - Alert events (`capacity.threshold_crossed`)

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
