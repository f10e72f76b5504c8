//! Event type definitions for fleet lifecycle and capacity alerts.
//!
//! The enums here are the closed vocabulary every collaborator speaks: pool
//! names, server status, resource dimensions and alert severities.

use std::net::IpAddr;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use fleetcap_id::{AlertId, ServerId};
use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    // Fleet
    pub const SERVER_ADDED: &str = "server.added";
    pub const SERVER_REMOVED: &str = "server.removed";
    pub const SERVER_MOVED: &str = "server.moved";
    pub const SERVER_DRAINING: &str = "server.draining";
    pub const SERVER_ACTIVATED: &str = "server.activated";

    // Capacity
    pub const CAPACITY_THRESHOLD_CROSSED: &str = "capacity.threshold_crossed";
}

// =============================================================================
// Pools and Servers
// =============================================================================

/// Logical pool a server belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolName {
    K8s,
    Vm,
    Unassigned,
}

impl PoolName {
    /// Every pool, in lock order.
    pub const ALL: [PoolName; 3] = [PoolName::K8s, PoolName::Vm, PoolName::Unassigned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::K8s => "k8s",
            Self::Vm => "vm",
            Self::Unassigned => "unassigned",
        }
    }

    /// Whether workloads may reserve capacity from this pool.
    ///
    /// `unassigned` only holds servers waiting for an operator decision.
    pub fn is_allocatable(&self) -> bool {
        !matches!(self, Self::Unassigned)
    }

    /// Dense index into per-pool arrays.
    pub fn index(&self) -> usize {
        match self {
            Self::K8s => 0,
            Self::Vm => 1,
            Self::Unassigned => 2,
        }
    }
}

impl std::fmt::Display for PoolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "k8s" => Ok(Self::K8s),
            "vm" => Ok(Self::Vm),
            "unassigned" => Ok(Self::Unassigned),
            other => Err(EventError::UnknownPool(other.to_string())),
        }
    }
}

/// Server lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Contributes its resources to its pool.
    Active,
    /// Still a pool member but excluded from the pool's capacity.
    Draining,
    /// Decommissioned. Kept for history, never hard-deleted.
    Removed,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Resources
// =============================================================================

/// One axis of a pool's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    CpuCores,
    MemoryGb,
    StorageGb,
    Iops,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::CpuCores,
        Dimension::MemoryGb,
        Dimension::StorageGb,
        Dimension::Iops,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CpuCores => "cpu_cores",
            Self::MemoryGb => "memory_gb",
            Self::StorageGb => "storage_gb",
            Self::Iops => "iops",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| EventError::UnknownDimension(s.to_string()))
    }
}

/// A bundle of resources: a server's spec, a pool's capacity, or a request.
///
/// Addition saturates instead of overflowing; capacity is a ceiling, so a
/// saturated sum still rejects every request that would not have fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu_cores: u64,
    pub memory_gb: u64,
    pub storage_gb: u64,
    #[serde(default)]
    pub iops: u64,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        cpu_cores: 0,
        memory_gb: 0,
        storage_gb: 0,
        iops: 0,
    };

    pub const fn new(cpu_cores: u64, memory_gb: u64, storage_gb: u64, iops: u64) -> Self {
        Self {
            cpu_cores,
            memory_gb,
            storage_gb,
            iops,
        }
    }

    pub fn get(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::CpuCores => self.cpu_cores,
            Dimension::MemoryGb => self.memory_gb,
            Dimension::StorageGb => self.storage_gb,
            Dimension::Iops => self.iops,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Component-wise subtraction clamped at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Capacity) -> Capacity {
        Capacity {
            cpu_cores: self.cpu_cores.saturating_sub(other.cpu_cores),
            memory_gb: self.memory_gb.saturating_sub(other.memory_gb),
            storage_gb: self.storage_gb.saturating_sub(other.storage_gb),
            iops: self.iops.saturating_sub(other.iops),
        }
    }

    /// True when every dimension is at or below `limit`.
    pub fn fits_within(&self, limit: &Capacity) -> bool {
        self.first_excess(limit).is_none()
    }

    /// First dimension (in `Dimension::ALL` order) exceeding `limit`, and by
    /// how much.
    pub fn first_excess(&self, limit: &Capacity) -> Option<(Dimension, u64)> {
        Dimension::ALL.into_iter().find_map(|d| {
            let (mine, theirs) = (self.get(d), limit.get(d));
            (mine > theirs).then(|| (d, mine - theirs))
        })
    }
}

impl Add for Capacity {
    type Output = Capacity;

    fn add(self, rhs: Capacity) -> Capacity {
        Capacity {
            cpu_cores: self.cpu_cores.saturating_add(rhs.cpu_cores),
            memory_gb: self.memory_gb.saturating_add(rhs.memory_gb),
            storage_gb: self.storage_gb.saturating_add(rhs.storage_gb),
            iops: self.iops.saturating_add(rhs.iops),
        }
    }
}

impl AddAssign for Capacity {
    fn add_assign(&mut self, rhs: Capacity) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Capacity {
    fn sum<I: Iterator<Item = Capacity>>(iter: I) -> Capacity {
        iter.fold(Capacity::ZERO, Add::add)
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cpu={} mem={}GB storage={}GB iops={}",
            self.cpu_cores, self.memory_gb, self.storage_gb, self.iops
        )
    }
}

// =============================================================================
// Fleet Events
// =============================================================================

/// Raw spec of a baremetal server as reported by orchestration tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Tooling-assigned id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,
    pub hostname: String,
    pub ip: IpAddr,
    pub cpu_cores: u64,
    pub memory_gb: u64,
    pub storage_gb: u64,
    #[serde(default)]
    pub iops: u64,
}

impl ServerSpec {
    /// Resources this server contributes while active.
    pub fn resources(&self) -> Capacity {
        Capacity::new(self.cpu_cores, self.memory_gb, self.storage_gb, self.iops)
    }
}

/// A server lifecycle change emitted by fleet orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    ServerAdded {
        spec: ServerSpec,
    },
    ServerRemoved {
        server_id: ServerId,
    },
    ServerMoved {
        server_id: ServerId,
        from: PoolName,
        to: PoolName,
        /// Operator affirms no workload depends on this server.
        #[serde(default)]
        drained: bool,
    },
    ServerDraining {
        server_id: ServerId,
    },
    ServerActivated {
        server_id: ServerId,
    },
}

impl FleetEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServerAdded { .. } => event_types::SERVER_ADDED,
            Self::ServerRemoved { .. } => event_types::SERVER_REMOVED,
            Self::ServerMoved { .. } => event_types::SERVER_MOVED,
            Self::ServerDraining { .. } => event_types::SERVER_DRAINING,
            Self::ServerActivated { .. } => event_types::SERVER_ACTIVATED,
        }
    }
}

// =============================================================================
// Alert Events
// =============================================================================

/// Alert level of one (pool, dimension) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted once per severity transition of a (pool, dimension) pair.
///
/// A transition back to `Normal` marks the previous alert resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: AlertId,
    pub pool: PoolName,
    pub dimension: Dimension,
    pub severity: Severity,
    pub previous: Severity,
    pub usage_pct: f64,
    pub used: u64,
    pub capacity: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn event_type(&self) -> &'static str {
        event_types::CAPACITY_THRESHOLD_CROSSED
    }

    /// True when this event clears an earlier warning or critical alert.
    pub fn is_resolution(&self) -> bool {
        self.severity == Severity::Normal
    }
}

// =============================================================================
// Tests
// =============================================================================
