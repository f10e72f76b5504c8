//! fleetcap capacity engine library.
//!
//! This crate primarily ships a `capacity-engine` binary, but the components
//! are exposed as a library for embedding and integration testing.
//!
//! - [`registry::PoolRegistry`] owns servers and pool membership
//! - [`capacity::CapacityAggregator`] derives versioned pool capacity
//! - [`ledger::AllocationLedger`] accepts or rejects reservations
//! - [`reconciler::ScalingReconciler`] applies fleet lifecycle events
//! - [`monitor::ThresholdMonitor`] turns usage into alert events

pub mod api;
pub mod capacity;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod reconciler;
pub mod registry;
pub mod sections;
pub mod shutdown;
pub mod state;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
