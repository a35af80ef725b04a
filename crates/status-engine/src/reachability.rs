//! Effective-Status Reachability
//!
//! Answers "can the backbone still reach this host?" for every host on a map,
//! independently of ring flags.

use crate::graph::Graph;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use topology::{Host, HostId, HostState, Link};

/// Role tag marking a backbone endpoint on a link
const CORE_ROLE: &str = "core";

/// Status after reachability analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectiveStatus {
    Up,
    Down,
    Unknown,
    /// UP locally but not reachable from any root
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityRow {
    pub host_id: HostId,
    pub effective_status: EffectiveStatus,
    /// The host itself is down
    pub is_root_cause: bool,
    /// Hops from the nearest root, for reachable hosts
    pub depth: Option<u32>,
}

/// Classify every host by reachability from the core.
///
/// Roots are hosts tagged `core` on at least one link; when no link carries
/// the tag, every host that has a link is a root. Only UP roots seed the
/// search, and traffic only crosses links whose endpoints are both UP. Uses each host's persisted `current_status`.
pub fn effective_statuses(hosts: &[Host], links: &[Link]) -> Vec<ReachabilityRow> {
    let states: HashMap<HostId, HostState> =
        hosts.iter().map(|h| (h.id, h.current_status)).collect();
    let is_up = |host: HostId| states.get(&host).is_some_and(HostState::is_up);

    let mut graph = Graph::new(states.keys().copied());
    for link in links {
        if is_up(link.origin_host_id) && is_up(link.dest_host_id) {
            graph.connect(link.origin_host_id, link.dest_host_id);
        }
    }

    let mut roots: BTreeSet<HostId> = links
        .iter()
        .flat_map(|link| {
            [
                (link.origin_host_id, link.origin_role.as_deref()),
                (link.dest_host_id, link.dest_role.as_deref()),
            ]
        })
        .filter(|(_, role)| role.is_some_and(|r| r.eq_ignore_ascii_case(CORE_ROLE)))
        .map(|(host, _)| host)
        .collect();
    if roots.is_empty() {
        roots = links
            .iter()
            .flat_map(|link| [link.origin_host_id, link.dest_host_id])
            .collect();
    }

    // a down root reaches nothing
    let sources: Vec<usize> = roots
        .iter()
        .filter(|h| is_up(**h))
        .filter_map(|h| graph.index_of(*h))
        .collect();
    let depths = graph.depths_from(&sources);

    let mut rows: Vec<ReachabilityRow> = hosts
        .iter()
        .map(|host| {
            let depth = graph.index_of(host.id).and_then(|i| depths[i]);
            let effective_status = match host.current_status {
                HostState::Down => EffectiveStatus::Down,
                HostState::Unknown => EffectiveStatus::Unknown,
                HostState::Up if depth.is_some() => EffectiveStatus::Up,
                HostState::Up => EffectiveStatus::Isolated,
            };
            ReachabilityRow {
                host_id: host.id,
                effective_status,
                is_root_cause: host.current_status == HostState::Down,
                depth,
            }
        })
        .collect();
    rows.sort_by_key(|row| row.host_id);
    rows
}
