//! Identifier types used across the capacity engine.

use crate::define_id;

// =============================================================================
// Fleet
// =============================================================================

define_id!(ServerId, "srv");

// =============================================================================
// Ledger and alerts
// =============================================================================

define_id!(AllocationId, "alloc");
define_id!(AlertId, "alrt");

// =============================================================================
// Requests
// =============================================================================

define_id!(RequestId, "req");

// =============================================================================
// Fleet event sequence
// =============================================================================

/// Position of a fleet lifecycle event in the orchestration tooling's stream.
///
/// Sequences are assigned by the producer and only ever increase; the
/// reconciler uses them to apply each event exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventSeq(u64);

impl EventSeq {
    /// Sequence before any event has been produced.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for EventSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventSeq {
    fn from(seq: u64) -> Self {
        Self(seq)
    }
}

impl serde::Serialize for EventSeq {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EventSeq {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self)
    }
}

// =============================================================================
// Tests
// =============================================================================
