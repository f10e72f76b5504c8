//! Application state shared across request handlers.

use std::sync::Arc;

use fleetcap_events::{EventEnvelope, FleetEvent};
use tokio::sync::mpsc;

use crate::engine::Engine;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: Arc<Engine>,
    fleet_events: mpsc::Sender<EventEnvelope<FleetEvent>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, fleet_events: mpsc::Sender<EventEnvelope<FleetEvent>>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                fleet_events,
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Sender feeding the reconciler worker.
    pub fn fleet_events(&self) -> &mpsc::Sender<EventEnvelope<FleetEvent>> {
        &self.inner.fleet_events
    }
}
