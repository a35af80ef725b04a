//! Ring-Break Detector

use crate::graph::Graph;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use topology::{HostId, HostState, Link, LinkId};

/// Ring links severed by the current statuses, and UP hosts cut off by them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RingBreakResult {
    pub impacted_link_ids: BTreeSet<LinkId>,
    pub isolated_host_ids: BTreeSet<HostId>,
}

/// Find impacted ring links and isolated ring hosts.
///
/// Only ring links whose endpoints are both UP carry traffic. The live
/// network is the largest connected group of UP ring hosts (ties go to the
/// group holding the lowest host id); every other UP ring host is isolated.
/// A ring link is impacted when either endpoint is isolated or not UP.
/// Hosts missing from `statuses` count as UNKNOWN.
pub fn detect_ring_breaks(links: &[Link], statuses: &HashMap<HostId, HostState>) -> RingBreakResult {
    let ring_links: Vec<&Link> = links.iter().filter(|link| link.is_ring).collect();
    let ring_hosts: BTreeSet<HostId> = ring_links
        .iter()
        .flat_map(|link| [link.origin_host_id, link.dest_host_id])
        .collect();
    let is_up = |host: HostId| statuses.get(&host).is_some_and(HostState::is_up);

    let up_hosts: Vec<HostId> = ring_hosts.iter().copied().filter(|h| is_up(*h)).collect();
    if up_hosts.is_empty() {
        return RingBreakResult {
            impacted_link_ids: ring_links.iter().map(|link| link.id).collect(),
            isolated_host_ids: ring_hosts,
        };
    }

    let mut graph = Graph::new(up_hosts.iter().copied());
    for link in &ring_links {
        if is_up(link.origin_host_id) && is_up(link.dest_host_id) {
            graph.connect(link.origin_host_id, link.dest_host_id);
        }
    }

    // components list indices ascending, so members[0] is the lowest id
    let live = graph
        .components()
        .into_iter()
        .max_by_key(|members| (members.len(), Reverse(members[0])))
        .unwrap_or_default();
    let reachable: BTreeSet<HostId> = live.into_iter().map(|i| graph.id(i)).collect();

    let isolated_host_ids: BTreeSet<HostId> = up_hosts
        .into_iter()
        .filter(|host| !reachable.contains(host))
        .collect();
    let severed = |host: HostId| !reachable.contains(&host);
    let impacted_link_ids = ring_links
        .iter()
        .filter(|link| severed(link.origin_host_id) || severed(link.dest_host_id))
        .map(|link| link.id)
        .collect();

    RingBreakResult {
        impacted_link_ids,
        isolated_host_ids,
    }
}
