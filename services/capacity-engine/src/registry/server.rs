//! Server records held by the registry.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use fleetcap_events::{Capacity, PoolName, ServerSpec, ServerStatus};
use fleetcap_id::ServerId;
use serde::Serialize;

/// A registered baremetal server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    pub id: ServerId,
    pub hostname: String,
    pub ip: IpAddr,
    pub pool: PoolName,
    #[serde(flatten)]
    pub resources: Capacity,
    pub status: ServerStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// New active server in the `unassigned` pool.
    pub(crate) fn from_spec(id: ServerId, spec: ServerSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            resources: spec.resources(),
            hostname: spec.hostname,
            ip: spec.ip,
            pool: PoolName::Unassigned,
            status: ServerStatus::Active,
            registered_at: now,
            updated_at: now,
        }
    }

    /// Member of its pool (anything but removed).
    pub fn is_live(&self) -> bool {
        self.status != ServerStatus::Removed
    }

    /// Counts toward its pool's capacity.
    pub fn contributes(&self) -> bool {
        self.status == ServerStatus::Active
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Filter for [`super::PoolRegistry::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerFilter {
    pub pool: Option<PoolName>,
    pub status: Option<ServerStatus>,
}

impl ServerFilter {
    pub fn matches(&self, server: &Server) -> bool {
        self.pool.is_none_or(|p| p == server.pool)
            && self.status.is_none_or(|s| s == server.status)
    }
}
