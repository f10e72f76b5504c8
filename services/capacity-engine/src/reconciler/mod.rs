//! Scaling reconciler.
//!
//! Translates fleet lifecycle events from orchestration tooling into registry
//! mutations. Capacity follows on its own: every mutation bumps the registry
//! version, and the aggregator recomputes on the next read.
//!
//! Envelopes carry a producer sequence. The reconciler keeps a checkpoint and
//! drops anything at or below it, so replayed batches are harmless.

mod worker;

use std::sync::Arc;

use fleetcap_events::{EventEnvelope, FleetEvent};
use fleetcap_id::EventSeq;
use fleetcap_reconcile::Checkpoint;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::registry::{PoolRegistry, RegistryError, Server};

pub use worker::ReconcilerWorker;

/// Failure to apply a fleet event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScalingError {
    /// Sequences start at 1; zero is the checkpoint's "nothing applied" mark.
    #[error("event sequence must be at least 1, got {0}")]
    InvalidSequence(EventSeq),

    #[error("event {seq} ({event_type}) rejected: {source}")]
    Rejected {
        seq: EventSeq,
        event_type: &'static str,
        #[source]
        source: RegistryError,
    },
}

impl ScalingError {
    /// The registry failure behind a rejected event.
    pub fn registry_error(&self) -> Option<&RegistryError> {
        match self {
            Self::Rejected { source, .. } => Some(source),
            Self::InvalidSequence(_) => None,
        }
    }
}

/// What happened to one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was applied; the server as it now stands.
    Applied(Server),
    /// The sequence was already processed.
    Replayed { seq: EventSeq, checkpoint: EventSeq },
}

/// Applies fleet events to the registry exactly once by sequence.
pub struct ScalingReconciler {
    registry: Arc<PoolRegistry>,
    checkpoint: Mutex<Checkpoint>,
}

impl ScalingReconciler {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            checkpoint: Mutex::new(Checkpoint::default()),
        }
    }

    /// Last processed sequence.
    pub async fn checkpoint(&self) -> EventSeq {
        self.checkpoint.lock().await.last_seq
    }

    /// Apply one envelope.
    ///
    /// The checkpoint advances even when the registry rejects the event: a
    /// rejected event is reported, not retried, and redelivery would be
    /// rejected again.
    #[instrument(
        skip(self, envelope),
        fields(seq = %envelope.seq, event_type = envelope.payload.event_type())
    )]
    pub async fn apply(
        &self,
        envelope: EventEnvelope<FleetEvent>,
    ) -> Result<ApplyOutcome, ScalingError> {
        if envelope.seq == EventSeq::ZERO {
            warn!(actor = %envelope.actor, "Fleet event without a sequence refused");
            return Err(ScalingError::InvalidSequence(envelope.seq));
        }

        // Held across the mutation so envelopes apply in sequence order.
        let mut checkpoint = self.checkpoint.lock().await;
        if checkpoint.is_processed(envelope.seq) {
            debug!(checkpoint = %checkpoint.last_seq, "Skipping replayed fleet event");
            return Ok(ApplyOutcome::Replayed {
                seq: envelope.seq,
                checkpoint: checkpoint.last_seq,
            });
        }

        let event_type = envelope.payload.event_type();
        let result = self.handle(envelope.payload).await;
        checkpoint.advance(envelope.seq);

        match result {
            Ok(server) => {
                info!(
                    server_id = %server.id,
                    pool = %server.pool,
                    status = %server.status,
                    actor = %envelope.actor,
                    "Fleet event applied"
                );
                Ok(ApplyOutcome::Applied(server))
            }
            Err(source) => {
                warn!(error = %source, actor = %envelope.actor, "Fleet event rejected");
                Err(ScalingError::Rejected {
                    seq: envelope.seq,
                    event_type,
                    source,
                })
            }
        }
    }

    async fn handle(&self, event: FleetEvent) -> Result<Server, RegistryError> {
        match event {
            FleetEvent::ServerAdded { spec } => self.registry.register_server(spec).await,
            // Pool-granular accounting: removal shrinks capacity and leaves
            // existing allocations in place.
            FleetEvent::ServerRemoved { server_id } => {
                self.registry.remove_server(server_id).await
            }
            FleetEvent::ServerMoved {
                server_id,
                from,
                to,
                drained,
            } => {
                self.registry
                    .move_server(server_id, Some(from), to, drained)
                    .await
            }
            FleetEvent::ServerDraining { server_id } => {
                self.registry.drain_server(server_id).await
            }
            FleetEvent::ServerActivated { server_id } => {
                self.registry.activate_server(server_id).await
            }
        }
    }
}
