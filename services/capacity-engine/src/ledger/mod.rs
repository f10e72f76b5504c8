//! Allocation ledger: the only component that accepts or rejects reservations.
//!
//! A reservation reads a capacity snapshot, enters the pool's section,
//! confirms the registry has not moved past the snapshot's version, then
//! recomputes usage and commits. A version mismatch means membership changed
//! between the snapshot and the lock; the whole check is retried once before
//! the caller sees `ConcurrentModification`.
//!
//! There is no queueing. Concurrent reservations against one pool are served
//! in the order they reach the section, and the first to get there takes the
//! remaining capacity.

mod error;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleetcap_events::{Capacity, Dimension, PoolName};
use fleetcap_id::AllocationId;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::capacity::{usage_pct, CapacityAggregator};
use crate::registry::PoolRegistry;
use crate::sections::PoolSections;

pub use error::{LedgerError, LedgerResult};

/// Internal retries of the version check before giving up.
pub const MAX_VERSION_RETRIES: u32 = 1;

/// A committed reservation of pool capacity by one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub pool: PoolName,
    pub workload_id: String,
    #[serde(flatten)]
    pub resources: Capacity,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    pub(crate) fn new(pool: PoolName, workload_id: &str, resources: Capacity) -> Self {
        Self {
            id: AllocationId::new(),
            pool,
            workload_id: workload_id.to_string(),
            resources,
            created_at: Utc::now(),
        }
    }
}

/// Usage of one resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DimensionUsage {
    pub dimension: Dimension,
    pub used: u64,
    pub capacity: u64,
    /// `None` when the pool has no capacity in this dimension.
    pub usage_pct: Option<f64>,
}

/// Capacity versus usage of one pool, for dashboards and the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub pool: PoolName,
    pub version: u64,
    pub capacity: Capacity,
    pub used: Capacity,
    pub available: Capacity,
    pub allocation_count: usize,
    /// Usage exceeds capacity, e.g. after a server was removed.
    pub over_committed: bool,
    pub dimensions: Vec<DimensionUsage>,
}

/// Tracks active allocations against pool capacity.
pub struct AllocationLedger {
    registry: Arc<PoolRegistry>,
    aggregator: Arc<CapacityAggregator>,
    sections: Arc<PoolSections>,
    /// Which pool holds each allocation. Entered after a section, never
    /// before one.
    index: RwLock<HashMap<AllocationId, PoolName>>,
}

impl AllocationLedger {
    pub fn new(
        registry: Arc<PoolRegistry>,
        aggregator: Arc<CapacityAggregator>,
        sections: Arc<PoolSections>,
    ) -> Self {
        Self {
            registry,
            aggregator,
            sections,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Reserve `request` from `pool` for `workload_id`.
    #[instrument(skip(self, request), fields(pool = %pool, workload_id = %workload_id))]
    pub async fn reserve(
        &self,
        pool: PoolName,
        workload_id: &str,
        request: Capacity,
    ) -> LedgerResult<Allocation> {
        if !pool.is_allocatable() {
            return Err(LedgerError::PoolNotAllocatable(pool));
        }
        if workload_id.trim().is_empty() {
            return Err(LedgerError::InvalidRequest(
                "workload_id must not be empty".to_string(),
            ));
        }
        if request.is_zero() {
            return Err(LedgerError::InvalidRequest(
                "request must ask for at least one resource".to_string(),
            ));
        }

        let attempts = MAX_VERSION_RETRIES + 1;
        for attempt in 1..=attempts {
            let snapshot = self.aggregator.snapshot(pool).await;
            let mut book = self.sections.lock(pool).await;

            // Membership cannot change while the section is held, so a version
            // that still matches here stays valid until commit.
            if self.registry.version() != snapshot.version {
                debug!(
                    attempt,
                    snapshot_version = snapshot.version,
                    "Registry changed during reservation"
                );
                continue;
            }

            if let Some(existing) = book.for_workload(workload_id) {
                return Err(LedgerError::DuplicateAllocation {
                    pool,
                    workload_id: workload_id.to_string(),
                    allocation_id: existing.id,
                });
            }

            let used = book.used();
            if let Some((dimension, excess)) = (used + request).first_excess(&snapshot.capacity) {
                debug!(
                    dimension = %dimension,
                    excess,
                    used = %used,
                    capacity = %snapshot.capacity,
                    "Reservation rejected"
                );
                return Err(LedgerError::InsufficientCapacity {
                    pool,
                    dimension,
                    requested: request.get(dimension),
                    available: snapshot.capacity.saturating_sub(used).get(dimension),
                    excess,
                });
            }

            let allocation = Allocation::new(pool, workload_id, request);
            book.insert(allocation.clone());
            self.index.write().await.insert(allocation.id, pool);

            info!(
                allocation_id = %allocation.id,
                resources = %request,
                version = snapshot.version,
                "Allocation reserved"
            );
            return Ok(allocation);
        }

        warn!(attempts, "Reservation abandoned after concurrent registry changes");
        Err(LedgerError::ConcurrentModification { pool, attempts })
    }

    /// Release an allocation. Unknown or already released ids are a no-op.
    ///
    /// Returns the allocation that was freed, if any.
    #[instrument(skip(self), fields(allocation_id = %id))]
    pub async fn release(&self, id: AllocationId) -> Option<Allocation> {
        let pool = self.index.read().await.get(&id).copied();
        let Some(pool) = pool else {
            debug!("Release of unknown allocation ignored");
            return None;
        };

        let mut book = self.sections.lock(pool).await;
        let released = book.remove(&id);
        if released.is_some() {
            self.index.write().await.remove(&id);
            info!(pool = %pool, "Allocation released");
        }
        released
    }

    pub async fn get(&self, id: AllocationId) -> LedgerResult<Allocation> {
        let pool = self.index.read().await.get(&id).copied();
        let pool = pool.ok_or(LedgerError::AllocationNotFound(id))?;
        self.sections
            .lock(pool)
            .await
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AllocationNotFound(id))
    }

    /// Active allocations of `pool`, oldest first.
    pub async fn allocations(&self, pool: PoolName) -> Vec<Allocation> {
        self.sections.lock(pool).await.allocations()
    }

    /// Capacity and usage of `pool` at one consistent point.
    pub async fn usage_report(&self, pool: PoolName) -> UsageReport {
        let snapshot = self.aggregator.snapshot(pool).await;
        let (used, allocation_count) = {
            let book = self.sections.lock(pool).await;
            (book.used(), book.len())
        };
        let capacity = snapshot.capacity;

        UsageReport {
            pool,
            version: snapshot.version,
            capacity,
            used,
            available: capacity.saturating_sub(used),
            allocation_count,
            over_committed: !used.fits_within(&capacity),
            dimensions: Dimension::ALL
                .into_iter()
                .map(|dimension| {
                    let (used, capacity) = (used.get(dimension), capacity.get(dimension));
                    DimensionUsage {
                        dimension,
                        used,
                        capacity,
                        usage_pct: usage_pct(used, capacity),
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DEFAULT_MAX_SERVERS;
    use fleetcap_events::ServerSpec;

    struct Fixture {
        sections: Arc<PoolSections>,
        registry: Arc<PoolRegistry>,
        ledger: Arc<AllocationLedger>,
    }

    fn fixture() -> Fixture {
        let sections = Arc::new(PoolSections::new());
        let registry = Arc::new(PoolRegistry::new(
            Arc::clone(&sections),
            DEFAULT_MAX_SERVERS,
        ));
        let aggregator = Arc::new(CapacityAggregator::new(Arc::clone(&registry)));
        let ledger = Arc::new(AllocationLedger::new(
            Arc::clone(&registry),
            aggregator,
            Arc::clone(&sections),
        ));
        Fixture {
            sections,
            registry,
            ledger,
        }
    }

    /// Registers a server in `unassigned`, which only bumps the version.
    async fn bump_version(registry: &PoolRegistry, hostname: &str) {
        registry
            .register_server(ServerSpec {
                id: None,
                hostname: hostname.to_string(),
                ip: "10.1.9.1".parse().unwrap(),
                cpu_cores: 1,
                memory_gb: 1,
                storage_gb: 1,
                iops: 0,
            })
            .await
            .unwrap();
    }

    /// Lets spawned tasks run until they park on a lock.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_reserve(
        ledger: &Arc<AllocationLedger>,
        workload_id: &'static str,
    ) -> tokio::task::JoinHandle<LedgerResult<Allocation>> {
        let ledger = Arc::clone(ledger);
        tokio::spawn(async move {
            ledger
                .reserve(PoolName::Vm, workload_id, Capacity::new(2, 4, 0, 0))
                .await
        })
    }

    #[tokio::test]
    async fn test_reserve_retries_once_after_version_change() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        // The reservation snapshots capacity, then parks on the held section.
        let guard = f.sections.lock(PoolName::Vm).await;
        let reserve = spawn_reserve(&f.ledger, "w1");
        settle().await;

        let before = f.registry.version();
        bump_version(&f.registry, "bm-02").await;
        assert!(f.registry.version() > before);
        drop(guard);

        let allocation = reserve.await.unwrap().unwrap();
        assert_eq!(allocation.workload_id, "w1");
        assert_eq!(f.ledger.usage_report(PoolName::Vm).await.allocation_count, 1);
    }

    #[tokio::test]
    async fn test_reserve_gives_up_after_second_version_change() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        let guard = f.sections.lock(PoolName::Vm).await;
        let reserve = spawn_reserve(&f.ledger, "w1");
        settle().await;
        bump_version(&f.registry, "bm-02").await;
        drop(guard);

        // Sections are FIFO: this queues behind the first attempt, and the
        // second attempt queues behind it after taking a fresh snapshot.
        let guard = f.sections.lock(PoolName::Vm).await;
        settle().await;
        bump_version(&f.registry, "bm-03").await;
        drop(guard);

        let err = reserve.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            LedgerError::ConcurrentModification {
                pool: PoolName::Vm,
                attempts: 2,
            }
        );
        assert!(err.is_retryable());
        assert!(f.ledger.allocations(PoolName::Vm).await.is_empty());
    }

    async fn add_server(registry: &PoolRegistry, hostname: &str, pool: PoolName, cpu: u64) {
        let server = registry
            .register_server(ServerSpec {
                id: None,
                hostname: hostname.to_string(),
                ip: "10.1.0.1".parse().unwrap(),
                cpu_cores: cpu,
                memory_gb: 32,
                storage_gb: 500,
                iops: 0,
            })
            .await
            .unwrap();
        registry.assign_pool(server.id, pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        let a = f
            .ledger
            .reserve(PoolName::Vm, "w1", Capacity::new(2, 8, 100, 0))
            .await
            .unwrap();
        assert_eq!(f.ledger.allocations(PoolName::Vm).await.len(), 1);
        assert_eq!(f.ledger.get(a.id).await.unwrap(), a);

        let released = f.ledger.release(a.id).await;
        assert_eq!(released.map(|r| r.id), Some(a.id));
        assert!(f.ledger.allocations(PoolName::Vm).await.is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_reports_dimension() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        let err = f
            .ledger
            .reserve(PoolName::Vm, "w1", Capacity::new(4, 40, 100, 0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCapacity {
                pool: PoolName::Vm,
                dimension: Dimension::MemoryGb,
                requested: 40,
                available: 32,
                excess: 8,
            }
        );
    }

    #[tokio::test]
    async fn test_one_allocation_per_workload_per_pool() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;
        add_server(&f.registry, "bm-02", PoolName::K8s, 8).await;

        let first = f
            .ledger
            .reserve(PoolName::Vm, "w1", Capacity::new(1, 1, 1, 0))
            .await
            .unwrap();
        let err = f
            .ledger
            .reserve(PoolName::Vm, "w1", Capacity::new(1, 1, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::DuplicateAllocation { allocation_id, .. } if allocation_id == first.id
        ));

        // Same workload in another pool is fine.
        assert!(f
            .ledger
            .reserve(PoolName::K8s, "w1", Capacity::new(1, 1, 1, 0))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        assert!(matches!(
            f.ledger
                .reserve(PoolName::Unassigned, "w1", Capacity::new(1, 0, 0, 0))
                .await,
            Err(LedgerError::PoolNotAllocatable(PoolName::Unassigned))
        ));
        assert!(matches!(
            f.ledger.reserve(PoolName::Vm, "", Capacity::new(1, 0, 0, 0)).await,
            Err(LedgerError::InvalidRequest(_))
        ));
        assert!(matches!(
            f.ledger.reserve(PoolName::Vm, "w1", Capacity::ZERO).await,
            Err(LedgerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_release_unknown_is_noop() {
        let f = fixture();
        assert!(f.ledger.release(AllocationId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_usage_report() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::K8s, 4).await;
        f.ledger
            .reserve(PoolName::K8s, "w1", Capacity::new(3, 16, 0, 0))
            .await
            .unwrap();

        let report = f.ledger.usage_report(PoolName::K8s).await;
        assert_eq!(report.available, Capacity::new(1, 16, 500, 0));
        assert_eq!(report.allocation_count, 1);
        assert!(!report.over_committed);

        let cpu = report.dimensions[0];
        assert_eq!(cpu.dimension, Dimension::CpuCores);
        assert_eq!(cpu.usage_pct, Some(75.0));
        let iops = report.dimensions[3];
        assert_eq!(iops.usage_pct, None);
    }

    #[tokio::test]
    async fn test_reserve_after_unrelated_registry_change() {
        let f = fixture();
        add_server(&f.registry, "bm-01", PoolName::Vm, 8).await;

        // Warm the cache, then bump the version without touching vm.
        f.ledger.usage_report(PoolName::Vm).await;
        add_server(&f.registry, "bm-02", PoolName::K8s, 8).await;

        // The cached vm snapshot is behind the registry and gets recomputed.
        assert!(f
            .ledger
            .reserve(PoolName::Vm, "w1", Capacity::new(1, 1, 1, 0))
            .await
            .is_ok());
    }
}
