//! Topology Store Boundary

use crate::{Host, HostId, HostState, Link, Scope, TopologyError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

/// Read access to a map's hosts and links.
///
/// The only write the core performs is refreshing `current_status`.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Hosts on the map, ordered by id
    async fn hosts(&self, scope: &Scope) -> Result<Vec<Host>, TopologyError>;

    /// Links on the map, ordered by id
    async fn links(&self, scope: &Scope) -> Result<Vec<Link>, TopologyError>;

    /// Persist the latest resolved state for each host; unknown ids are skipped
    async fn update_current_status(
        &self,
        scope: &Scope,
        statuses: &[(HostId, HostState)],
    ) -> Result<(), TopologyError>;
}

#[derive(Debug, Default)]
struct MapRecords {
    hosts: BTreeMap<HostId, Host>,
    links: BTreeMap<i64, Link>,
}

/// In-memory topology store
pub struct MemoryTopology {
    maps: Mutex<HashMap<Scope, MapRecords>>,
}

impl MemoryTopology {
    pub fn new() -> Self {
        info!("Creating in-memory topology store");
        Self {
            maps: Mutex::new(HashMap::new()),
        }
    }

    /// Add a host to a map
    pub fn insert_host(&self, tenant_id: &str, host: Host) -> Result<(), TopologyError> {
        let mut maps = self.lock()?;
        let records = maps.entry(Scope::new(tenant_id, host.map_id)).or_default();
        if records.hosts.contains_key(&host.id) {
            return Err(TopologyError::DuplicateHost(host.id));
        }
        records.hosts.insert(host.id, host);
        Ok(())
    }

    /// Add a link to a map, keeping one link per unordered host pair
    pub fn insert_link(&self, tenant_id: &str, link: Link) -> Result<(), TopologyError> {
        if link.origin_host_id == link.dest_host_id {
            return Err(TopologyError::SelfLink(link.id));
        }
        let mut maps = self.lock()?;
        let records = maps.entry(Scope::new(tenant_id, link.map_id)).or_default();
        let pair = link.pair();
        if records.links.values().any(|l| l.pair() == pair) {
            return Err(TopologyError::DuplicateLink(pair.0, pair.1));
        }
        records.links.insert(link.id, link);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Scope, MapRecords>>, TopologyError> {
        self.maps
            .lock()
            .map_err(|e| TopologyError::Store(format!("Lock error: {}", e)))
    }
}

impl Default for MemoryTopology {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopologyStore for MemoryTopology {
    async fn hosts(&self, scope: &Scope) -> Result<Vec<Host>, TopologyError> {
        let maps = self.lock()?;
        Ok(maps
            .get(scope)
            .map(|r| r.hosts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn links(&self, scope: &Scope) -> Result<Vec<Link>, TopologyError> {
        let maps = self.lock()?;
        Ok(maps
            .get(scope)
            .map(|r| r.links.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_current_status(
        &self,
        scope: &Scope,
        statuses: &[(HostId, HostState)],
    ) -> Result<(), TopologyError> {
        let mut maps = self.lock()?;
        let Some(records) = maps.get_mut(scope) else {
            return Ok(());
        };
        for (host_id, state) in statuses {
            if let Some(host) = records.hosts.get_mut(host_id) {
                host.current_status = *state;
            }
        }
        debug!("Updated {} host statuses for {}", statuses.len(), scope);
        Ok(())
    }
}
