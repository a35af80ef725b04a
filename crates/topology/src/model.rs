//! Topology Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TopologyError;

pub type HostId = i64;
pub type LinkId = i64;
pub type MapId = i64;
pub type TenantId = String;

/// A (tenant, map) pair; every read in the core is scoped by one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: TenantId,
    pub map_id: MapId,
}

impl Scope {
    pub fn new(tenant_id: impl Into<TenantId>, map_id: MapId) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            map_id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.map_id)
    }
}

/// Liveness of a single host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl HostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostState::Up => "UP",
            HostState::Down => "DOWN",
            HostState::Unknown => "UNKNOWN",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, HostState::Up)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostState {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(HostState::Up),
            "DOWN" => Ok(HostState::Down),
            "UNKNOWN" => Ok(HostState::Unknown),
            other => Err(TopologyError::Store(format!("invalid host state: {other}"))),
        }
    }
}

/// Resolved status for one host in one poll cycle.
///
/// Always replaced wholesale; never patched field by field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub status: HostState,
    /// Round-trip ICMP latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_problem: Option<bool>,
}

impl HostStatus {
    /// Status for a host the monitoring backend knows nothing about
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Host record on a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub map_id: MapId,
    /// Identifier of the host in the monitoring backend
    pub external_id: Option<String>,
    pub name: String,
    pub group: Option<String>,
    pub location: Option<String>,
    pub is_critical: bool,
    /// Last status persisted by a poll
    pub current_status: HostState,
}

impl Host {
    pub fn new(id: HostId, map_id: MapId, name: impl Into<String>) -> Self {
        Self {
            id,
            map_id,
            external_id: None,
            name: name.into(),
            group: None,
            location: None,
            is_critical: false,
            current_status: HostState::Unknown,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_status(mut self, status: HostState) -> Self {
        self.current_status = status;
        self
    }
}

/// Link between two hosts. Stored directed, treated as undirected for reachability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub map_id: MapId,
    pub origin_host_id: HostId,
    pub dest_host_id: HostId,
    pub is_ring: bool,
    pub priority: i32,
    /// Role tag of the origin endpoint on this link (e.g. "core")
    pub origin_role: Option<String>,
    pub dest_role: Option<String>,
}

impl Link {
    /// Create a link, rejecting self-links
    pub fn new(
        id: LinkId,
        map_id: MapId,
        origin_host_id: HostId,
        dest_host_id: HostId,
    ) -> Result<Self, TopologyError> {
        if origin_host_id == dest_host_id {
            return Err(TopologyError::SelfLink(id));
        }
        Ok(Self {
            id,
            map_id,
            origin_host_id,
            dest_host_id,
            is_ring: false,
            priority: 0,
            origin_role: None,
            dest_role: None,
        })
    }

    /// Create a ring link
    pub fn ring(
        id: LinkId,
        map_id: MapId,
        origin_host_id: HostId,
        dest_host_id: HostId,
    ) -> Result<Self, TopologyError> {
        let mut link = Self::new(id, map_id, origin_host_id, dest_host_id)?;
        link.is_ring = true;
        Ok(link)
    }

    pub fn with_roles(mut self, origin: Option<&str>, dest: Option<&str>) -> Self {
        self.origin_role = origin.map(str::to_string);
        self.dest_role = dest.map(str::to_string);
        self
    }

    /// Endpoints ordered low to high, identifying the unordered pair
    pub fn pair(&self) -> (HostId, HostId) {
        if self.origin_host_id <= self.dest_host_id {
            (self.origin_host_id, self.dest_host_id)
        } else {
            (self.dest_host_id, self.origin_host_id)
        }
    }

    pub fn touches(&self, host_id: HostId) -> bool {
        self.origin_host_id == host_id || self.dest_host_id == host_id
    }
}
