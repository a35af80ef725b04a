//! Network Topology
//!
//! Host and link records for a tenant's maps, the per-poll status types
//! derived from telemetry, and the read-mostly store the core consumes them
//! through.

mod model;
mod store;

pub use model::{
    Host, HostId, HostState, HostStatus, Link, LinkId, MapId, Scope, TenantId,
};
pub use store::{MemoryTopology, TopologyStore};

use thiserror::Error;

/// Topology errors
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Link {0} connects a host to itself")]
    SelfLink(LinkId),
    #[error("Hosts {0} and {1} are already linked on this map")]
    DuplicateLink(HostId, HostId),
    #[error("Host {0} already exists on this map")]
    DuplicateHost(HostId),
    #[error("Store error: {0}")]
    Store(String),
}
