//! Event envelope - the common wrapper for fleet events.

use chrono::{DateTime, Utc};
use fleetcap_id::EventSeq;
use serde::{Deserialize, Serialize};

/// Sequenced wrapper around an event.
///
/// The producer assigns `seq`; consumers use it to drop replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    /// Producer-assigned, strictly increasing sequence number.
    pub seq: EventSeq,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Identity of the producer (tool name, operator, etc.).
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Event-specific payload.
    pub payload: P,
}

fn default_actor() -> String {
    "orchestration".to_string()
}

impl<P> EventEnvelope<P> {
    /// Wraps `payload` at `seq`, stamped with the current time.
    pub fn new(seq: EventSeq, payload: P) -> Self {
        Self {
            seq,
            occurred_at: Utc::now(),
            actor: default_actor(),
            payload,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Hands out increasing sequence numbers for in-process producers.
#[derive(Debug, Default)]
pub struct Sequencer {
    last: EventSeq,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `payload` in an envelope at the next sequence.
    pub fn wrap<P>(&mut self, payload: P) -> EventEnvelope<P> {
        self.last = self.last.next();
        EventEnvelope::new(self.last, payload)
    }
}
