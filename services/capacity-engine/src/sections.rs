//! Per-pool critical sections.
//!
//! Every pool owns one FIFO mutex guarding its allocation book. The ledger
//! takes it to check and commit reservations; the registry takes it (for the
//! source and destination pools) before changing membership. Pools never share
//! a section, so traffic against `vm` does not wait on `k8s`.
//!
//! Lock order: sections in `PoolName::ALL` order, then the registry's store,
//! then the ledger's allocation index.

use std::collections::HashMap;

use fleetcap_events::{Capacity, PoolName};
use fleetcap_id::AllocationId;
use tokio::sync::{Mutex, MutexGuard};

use crate::ledger::Allocation;

/// Active allocations of one pool.
#[derive(Debug, Default)]
pub struct PoolBook {
    allocations: HashMap<AllocationId, Allocation>,
    by_workload: HashMap<String, AllocationId>,
}

impl PoolBook {
    /// Sum of all active allocations, recomputed on every call.
    pub fn used(&self) -> Capacity {
        self.allocations.values().map(|a| a.resources).sum()
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn get(&self, id: &AllocationId) -> Option<&Allocation> {
        self.allocations.get(id)
    }

    pub fn for_workload(&self, workload_id: &str) -> Option<&Allocation> {
        self.by_workload
            .get(workload_id)
            .and_then(|id| self.allocations.get(id))
    }

    /// Allocations ordered by creation.
    pub fn allocations(&self) -> Vec<Allocation> {
        let mut all: Vec<_> = self.allocations.values().cloned().collect();
        all.sort_by_key(|a| a.id);
        all
    }

    pub(crate) fn insert(&mut self, allocation: Allocation) {
        self.by_workload
            .insert(allocation.workload_id.clone(), allocation.id);
        self.allocations.insert(allocation.id, allocation);
    }

    pub(crate) fn remove(&mut self, id: &AllocationId) -> Option<Allocation> {
        let removed = self.allocations.remove(id)?;
        self.by_workload.remove(&removed.workload_id);
        Some(removed)
    }
}

/// The set of per-pool sections.
#[derive(Debug, Default)]
pub struct PoolSections {
    books: [Mutex<PoolBook>; 3],
}

impl PoolSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter one pool's section. Waiters are served in arrival order.
    pub async fn lock(&self, pool: PoolName) -> MutexGuard<'_, PoolBook> {
        self.books[pool.index()].lock().await
    }

    /// Enter several sections at once, in lock order. Duplicates are entered
    /// once.
    pub async fn lock_many(&self, pools: &[PoolName]) -> HeldSections<'_> {
        let mut ordered = pools.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for pool in ordered {
            guards.push((pool, self.lock(pool).await));
        }
        HeldSections { guards }
    }
}

/// Guards for the sections entered by [`PoolSections::lock_many`].
pub struct HeldSections<'a> {
    guards: Vec<(PoolName, MutexGuard<'a, PoolBook>)>,
}

impl HeldSections<'_> {
    pub fn book(&self, pool: PoolName) -> Option<&PoolBook> {
        self.guards
            .iter()
            .find(|(held, _)| *held == pool)
            .map(|(_, guard)| &**guard)
    }
}
