//! Ledger error types.

use fleetcap_events::{Dimension, PoolName};
use fleetcap_id::AllocationId;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Reasons a reservation is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The pool has no room for the request right now. Expected and frequent.
    #[error(
        "insufficient capacity in {pool}: {dimension} requested {requested}, available {available} (short by {excess})"
    )]
    InsufficientCapacity {
        pool: PoolName,
        dimension: Dimension,
        requested: u64,
        available: u64,
        excess: u64,
    },

    /// Pool membership kept changing during the reservation check.
    #[error("concurrent modification of {pool} after {attempts} attempts; retry")]
    ConcurrentModification { pool: PoolName, attempts: u32 },

    /// The workload already holds an allocation in this pool.
    #[error("workload '{workload_id}' already holds {allocation_id} in {pool}")]
    DuplicateAllocation {
        pool: PoolName,
        workload_id: String,
        allocation_id: AllocationId,
    },

    #[error("pool {0} does not accept allocations")]
    PoolNotAllocatable(PoolName),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("allocation not found: {0}")]
    AllocationNotFound(AllocationId),
}

impl LedgerError {
    /// Whether the caller may succeed by simply retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
