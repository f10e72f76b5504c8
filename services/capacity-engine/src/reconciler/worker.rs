//! Reconciler background worker.
//!
//! Drains fleet event envelopes from a channel and applies them in arrival
//! order until shutdown or until every sender is dropped.

use std::sync::Arc;

use fleetcap_events::{EventEnvelope, FleetEvent};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument};

use super::ScalingReconciler;

/// Worker that feeds a channel of fleet events into the reconciler.
pub struct ReconcilerWorker {
    reconciler: Arc<ScalingReconciler>,
    events: mpsc::Receiver<EventEnvelope<FleetEvent>>,
}

impl ReconcilerWorker {
    pub fn new(
        reconciler: Arc<ScalingReconciler>,
        events: mpsc::Receiver<EventEnvelope<FleetEvent>>,
    ) -> Self {
        Self { reconciler, events }
    }

    /// Run until shutdown is signaled or the channel closes.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting reconciler worker");

        loop {
            tokio::select! {
                envelope = self.events.recv() => {
                    let Some(envelope) = envelope else {
                        info!("Fleet event channel closed");
                        break;
                    };
                    if let Err(e) = self.reconciler.apply(envelope).await {
                        error!(error = %e, "Fleet event not applied");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconciler worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
