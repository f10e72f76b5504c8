//! Pool registry: the authoritative server and pool membership store.
//!
//! Pools are never stored on their own. A pool is the set of live servers
//! whose `pool` field names it, so membership cannot drift between two
//! sources of truth.
//!
//! Every successful mutation bumps a registry-wide version. The capacity
//! aggregator compares against it to invalidate cached snapshots, and the
//! ledger uses it to detect a membership change racing with a reservation.

mod error;
mod server;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fleetcap_events::{Capacity, PoolName, ServerSpec, ServerStatus};
use fleetcap_id::ServerId;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::sections::PoolSections;

pub use error::{RegistryError, RegistryResult};
pub use server::{Server, ServerFilter};

/// Default cap on live servers, matching the dashboard's fleet limit.
pub const DEFAULT_MAX_SERVERS: usize = 200;

/// Members and summed capacity of one pool at one registry version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTally {
    pub pool: PoolName,
    pub version: u64,
    pub capacity: Capacity,
    pub active_servers: usize,
    pub draining_servers: usize,
}

#[derive(Debug, Default)]
struct Store {
    servers: HashMap<ServerId, Server>,
    version: u64,
}

impl Store {
    fn tally(&self, pool: PoolName) -> PoolTally {
        let mut tally = PoolTally {
            pool,
            version: self.version,
            capacity: Capacity::ZERO,
            active_servers: 0,
            draining_servers: 0,
        };
        for server in self.servers.values().filter(|s| s.pool == pool) {
            match server.status {
                ServerStatus::Active => {
                    tally.capacity += server.resources;
                    tally.active_servers += 1;
                }
                ServerStatus::Draining => tally.draining_servers += 1,
                ServerStatus::Removed => {}
            }
        }
        tally
    }

    fn live_count(&self) -> usize {
        self.servers.values().filter(|s| s.is_live()).count()
    }
}

/// Authoritative server store with serialized mutation.
pub struct PoolRegistry {
    store: RwLock<Store>,
    /// Mirror of `store.version` for lock-free staleness checks.
    version: AtomicU64,
    sections: Arc<PoolSections>,
    max_servers: usize,
}

impl PoolRegistry {
    pub fn new(sections: Arc<PoolSections>, max_servers: usize) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            version: AtomicU64::new(0),
            sections,
            max_servers,
        }
    }

    /// Current registry version. Strictly increases on every mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn commit(&self, store: &mut Store) -> u64 {
        store.version += 1;
        self.version.store(store.version, Ordering::Release);
        store.version
    }

    async fn locate(&self, id: &ServerId) -> RegistryResult<PoolName> {
        self.store
            .read()
            .await
            .servers
            .get(id)
            .map(|s| s.pool)
            .ok_or(RegistryError::ServerNotFound(*id))
    }

    /// Add a server to the `unassigned` pool with `active` status.
    #[instrument(skip(self, spec), fields(hostname = %spec.hostname))]
    pub async fn register_server(&self, spec: ServerSpec) -> RegistryResult<Server> {
        let hostname = spec.hostname.trim();
        if hostname.is_empty() {
            return Err(RegistryError::InvalidSpec(
                "hostname must not be empty".to_string(),
            ));
        }
        let hostname = hostname.to_string();
        let id = spec.id.unwrap_or_default();

        let _section = self.sections.lock(PoolName::Unassigned).await;
        let mut store = self.store.write().await;

        // Ids are never reused, even after removal.
        if store.servers.contains_key(&id) {
            return Err(RegistryError::DuplicateServer {
                field: "id",
                value: id.to_string(),
            });
        }
        if store
            .servers
            .values()
            .any(|s| s.is_live() && s.hostname == hostname)
        {
            return Err(RegistryError::DuplicateServer {
                field: "hostname",
                value: hostname,
            });
        }
        if store.live_count() >= self.max_servers {
            return Err(RegistryError::FleetLimitReached {
                limit: self.max_servers,
            });
        }

        let server = Server::from_spec(
            id,
            ServerSpec {
                hostname,
                ..spec
            },
        );
        store.servers.insert(id, server.clone());
        let version = self.commit(&mut store);

        info!(
            server_id = %id,
            resources = %server.resources,
            version,
            "Server registered"
        );
        Ok(server)
    }

    /// Move a server into `to`. See [`PoolRegistry::move_server`].
    pub async fn assign_pool(&self, id: ServerId, to: PoolName) -> RegistryResult<Server> {
        self.move_server(id, None, to, false).await
    }

    /// Move a server between pools in one registry transaction.
    ///
    /// Both pools' sections are held, so the server's contribution leaves the
    /// source and lands in the destination at the same version.
    ///
    /// Leaving an allocatable pool requires the drain precondition: either the
    /// server is already `draining`, `drained` is set by the operator, or the
    /// source pool's allocations still fit without this server. `expected_from`
    /// rejects a stale move when the server is no longer where the caller
    /// thinks it is.
    #[instrument(skip(self), fields(server_id = %id, to = %to))]
    pub async fn move_server(
        &self,
        id: ServerId,
        expected_from: Option<PoolName>,
        to: PoolName,
        drained: bool,
    ) -> RegistryResult<Server> {
        loop {
            let from = self.locate(&id).await?;
            let sections = self.sections.lock_many(&[from, to]).await;
            let mut store = self.store.write().await;

            let Some(server) = store.servers.get(&id) else {
                return Err(RegistryError::ServerNotFound(id));
            };
            if server.pool != from {
                // Moved by someone else between locate and lock.
                continue;
            }

            let reject = |reason: String| RegistryError::InvalidPoolTransition {
                server_id: id,
                from,
                to,
                reason,
            };

            if let Some(expected) = expected_from {
                if expected != from {
                    return Err(reject(format!("server is in pool {from}, not {expected}")));
                }
            }
            if server.status == ServerStatus::Removed {
                return Err(reject("server has been removed".to_string()));
            }
            if from == to {
                debug!("Server already in target pool");
                return Ok(server.clone());
            }

            let affirmed = drained || server.status == ServerStatus::Draining;
            if from.is_allocatable() && !affirmed && server.contributes() {
                let remaining = store.tally(from).capacity.saturating_sub(server.resources);
                let used = sections
                    .book(from)
                    .map(|book| book.used())
                    .unwrap_or(Capacity::ZERO);
                if let Some((dimension, excess)) = used.first_excess(&remaining) {
                    return Err(reject(format!(
                        "allocations in {from} still need {excess} {dimension} of this server; drain it first"
                    )));
                }
            }

            let server = match store.servers.get_mut(&id) {
                Some(server) => {
                    server.pool = to;
                    server.status = ServerStatus::Active;
                    server.touch();
                    server.clone()
                }
                None => return Err(RegistryError::ServerNotFound(id)),
            };
            let version = self.commit(&mut store);

            info!(from = %from, version, "Server moved");
            return Ok(server);
        }
    }

    /// Apply a status change to a server while holding its pool's section.
    async fn set_status(
        &self,
        id: ServerId,
        status: ServerStatus,
    ) -> RegistryResult<Server> {
        loop {
            let pool = self.locate(&id).await?;
            let _section = self.sections.lock(pool).await;
            let mut store = self.store.write().await;

            let Some(server) = store.servers.get_mut(&id) else {
                return Err(RegistryError::ServerNotFound(id));
            };
            if server.pool != pool {
                continue;
            }
            if server.status == status {
                return Ok(server.clone());
            }
            if server.status == ServerStatus::Removed {
                return Err(RegistryError::InvalidPoolTransition {
                    server_id: id,
                    from: pool,
                    to: pool,
                    reason: format!("removed server cannot become {status}"),
                });
            }

            let previous = server.status;
            server.status = status;
            server.touch();
            let server = server.clone();
            let version = self.commit(&mut store);

            info!(
                server_id = %id,
                pool = %pool,
                from = %previous,
                to = %status,
                version,
                "Server status changed"
            );
            return Ok(server);
        }
    }

    /// Mark a server removed. Its history stays in the registry.
    ///
    /// Existing allocations in its pool are left alone even when the pool
    /// ends up over-committed.
    pub async fn remove_server(&self, id: ServerId) -> RegistryResult<Server> {
        self.set_status(id, ServerStatus::Removed).await
    }

    /// Take a server out of its pool's capacity without changing membership.
    pub async fn drain_server(&self, id: ServerId) -> RegistryResult<Server> {
        self.set_status(id, ServerStatus::Draining).await
    }

    /// Return a draining server to its pool's capacity.
    pub async fn activate_server(&self, id: ServerId) -> RegistryResult<Server> {
        self.set_status(id, ServerStatus::Active).await
    }

    pub async fn get(&self, id: &ServerId) -> RegistryResult<Server> {
        self.store
            .read()
            .await
            .servers
            .get(id)
            .cloned()
            .ok_or(RegistryError::ServerNotFound(*id))
    }

    /// Servers matching `filter`, ordered by id.
    pub async fn list(&self, filter: ServerFilter) -> Vec<Server> {
        let store = self.store.read().await;
        let mut servers: Vec<_> = store
            .servers
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        servers.sort_by_key(|s| s.id);
        servers
    }

    /// Live members of `pool`.
    pub async fn members(&self, pool: PoolName) -> Vec<Server> {
        let mut members = self
            .list(ServerFilter {
                pool: Some(pool),
                status: None,
            })
            .await;
        members.retain(Server::is_live);
        members
    }

    /// Capacity of `pool`, computed at a single registry version.
    pub async fn tally(&self, pool: PoolName) -> PoolTally {
        self.store.read().await.tally(pool)
    }

    /// Every pool's tally at the same version.
    pub async fn tally_all(&self) -> Vec<PoolTally> {
        let store = self.store.read().await;
        PoolName::ALL.iter().map(|p| store.tally(*p)).collect()
    }
}
