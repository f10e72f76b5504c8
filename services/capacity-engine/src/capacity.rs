//! Capacity aggregation.
//!
//! A pool's capacity is the sum of its active members' resources. Snapshots
//! are cached per pool and tagged with the registry version they were
//! computed at; a cached snapshot is served until the registry version moves,
//! then recomputed lazily on the next read. Nothing is pushed eagerly, so a
//! burst of fleet churn costs one recomputation per reader, not per event.

use std::sync::Arc;

use fleetcap_events::{Capacity, PoolName};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::trace;

use crate::registry::{PoolRegistry, PoolTally};

/// Immutable capacity of one pool at one registry version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub pool: PoolName,
    pub capacity: Capacity,
    pub version: u64,
    pub active_servers: usize,
    pub draining_servers: usize,
}

impl From<PoolTally> for CapacitySnapshot {
    fn from(tally: PoolTally) -> Self {
        Self {
            pool: tally.pool,
            capacity: tally.capacity,
            version: tally.version,
            active_servers: tally.active_servers,
            draining_servers: tally.draining_servers,
        }
    }
}

/// Fleet-wide totals, all pools computed at the same version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub version: u64,
    pub total: Capacity,
    pub pools: Vec<CapacitySnapshot>,
}

/// Usage as a percentage of capacity; `None` when capacity is zero.
pub fn usage_pct(used: u64, capacity: u64) -> Option<f64> {
    (capacity > 0).then(|| used as f64 / capacity as f64 * 100.0)
}

/// Derives per-pool capacity from registry membership.
pub struct CapacityAggregator {
    registry: Arc<PoolRegistry>,
    cache: Mutex<[Option<CapacitySnapshot>; 3]>,
}

impl CapacityAggregator {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new([None; 3]),
        }
    }

    /// Capacity of `pool`, with the registry version it reflects.
    ///
    /// Two snapshots with the same version always carry the same capacity.
    pub async fn snapshot(&self, pool: PoolName) -> CapacitySnapshot {
        let current = self.registry.version();
        if let Some(cached) = self.cache.lock().await[pool.index()] {
            if cached.version == current {
                return cached;
            }
        }

        let fresh = CapacitySnapshot::from(self.registry.tally(pool).await);
        trace!(
            pool = %pool,
            version = fresh.version,
            capacity = %fresh.capacity,
            "Recomputed capacity snapshot"
        );

        let mut cache = self.cache.lock().await;
        let slot = &mut cache[pool.index()];
        if slot.is_none_or(|old| old.version < fresh.version) {
            *slot = Some(fresh);
        }
        fresh
    }

    /// Totals across every pool at a single registry version.
    pub async fn fleet_summary(&self) -> FleetSummary {
        let tallies = self.registry.tally_all().await;
        let version = tallies.first().map(|t| t.version).unwrap_or_default();
        let pools: Vec<CapacitySnapshot> = tallies.into_iter().map(Into::into).collect();
        FleetSummary {
            version,
            total: pools.iter().map(|p| p.capacity).sum(),
            pools,
        }
    }
}
