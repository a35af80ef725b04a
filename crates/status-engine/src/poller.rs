//! Poll Orchestration
//!
//! topology + telemetry -> resolver -> ring-break detector -> cache

use crate::reachability::{effective_statuses, ReachabilityRow};
use crate::resolver::resolve;
use crate::ring::detect_ring_breaks;
use crate::PollError;
use chrono::Utc;
use result_cache::{CacheConfig, ResultCache};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use telemetry::{Connection, SubQuery, TelemetryError, TelemetrySnapshot, TelemetrySource};
use topology::{HostId, HostState, HostStatus, LinkId, Scope, TopologyStore};
use tracing::{debug, info, warn};

/// Status of a map as served to clients
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    /// Keyed by the monitoring backend's host id
    pub hosts: BTreeMap<String, HostStatus>,
    pub impacted_links: Vec<LinkId>,
    pub isolated_nodes: Vec<HostId>,
}

/// Request-driven poller with a short-lived result cache
pub struct StatusPoller {
    topology: Arc<dyn TopologyStore>,
    source: Arc<dyn TelemetrySource>,
    cache: ResultCache<Scope, Arc<PollResult>>,
    deadline: Duration,
}

impl StatusPoller {
    pub fn new(
        topology: Arc<dyn TopologyStore>,
        source: Arc<dyn TelemetrySource>,
        cache: &CacheConfig,
        deadline: Duration,
    ) -> Self {
        info!(
            "Creating status poller (cache ttl {}s, deadline {:?})",
            cache.ttl_secs, deadline
        );
        Self {
            topology,
            source,
            cache: ResultCache::new(cache),
            deadline,
        }
    }

    /// Current status of a map, served from cache when fresh
    pub async fn poll(&self, scope: &Scope, conn: &Connection) -> Result<Arc<PollResult>, PollError> {
        let (result, lookup) = self
            .cache
            .get_or_try_fetch(scope, || async move {
                self.compute(scope, conn).await.map(Arc::new)
            })
            .await?;
        debug!("Poll {} served ({})", scope, lookup.as_str());
        metrics::counter!("ringwatch_poll_total", "cache" => lookup.as_str()).increment(1);
        Ok(result)
    }

    /// Reachability from the core using each host's persisted status
    pub async fn reachability(&self, scope: &Scope) -> Result<Vec<ReachabilityRow>, PollError> {
        let hosts = self.topology.hosts(scope).await?;
        let links = self.topology.links(scope).await?;
        Ok(effective_statuses(&hosts, &links))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    async fn compute(&self, scope: &Scope, conn: &Connection) -> Result<PollResult, PollError> {
        let started = StdInstant::now();
        let hosts = self.topology.hosts(scope).await?;
        let links = self.topology.links(scope).await?;

        let mut external_ids: Vec<String> = hosts.iter().filter_map(|h| h.external_id.clone()).collect();
        external_ids.sort();
        external_ids.dedup();

        let deadline = tokio::time::Instant::now() + self.deadline;
        let snapshot = self.source.fetch(conn, &external_ids, deadline).await;
        for failure in &snapshot.failures {
            metrics::counter!("ringwatch_telemetry_failures_total", "query" => failure.query.as_str())
                .increment(1);
        }
        if let Some(error) = auth_blackout(&snapshot) {
            warn!("Monitoring backend rejected every query for {}: {}", scope, error);
            return Err(PollError::Upstream(error));
        }

        let problems_unknown = snapshot.failed(SubQuery::Problems);
        let now = Utc::now();
        let mut statuses: HashMap<HostId, HostState> = HashMap::with_capacity(hosts.len());
        let mut by_external: BTreeMap<String, HostStatus> = BTreeMap::new();
        for host in &hosts {
            let mut status = match host.external_id.as_deref() {
                Some(ext) => resolve(
                    snapshot.hosts.get(ext),
                    snapshot.has_problem(ext),
                    snapshot.latency.get(ext),
                    now,
                ),
                None => HostStatus::unknown(),
            };
            // without trigger data an UP verdict could be hiding a firing trigger
            if problems_unknown && status.status == HostState::Up {
                status.status = HostState::Unknown;
                status.trigger_problem = None;
            }
            statuses.insert(host.id, status.status);
            if let Some(ext) = &host.external_id {
                by_external.insert(ext.clone(), status);
            }
        }

        let breaks = detect_ring_breaks(&links, &statuses);
        if !breaks.isolated_host_ids.is_empty() {
            warn!(
                "Ring break on {}: {} hosts isolated, {} links impacted",
                scope,
                breaks.isolated_host_ids.len(),
                breaks.impacted_link_ids.len()
            );
        }

        let mut persisted: Vec<(HostId, HostState)> = statuses.into_iter().collect();
        persisted.sort_unstable_by_key(|(id, _)| *id);
        if let Err(e) = self.topology.update_current_status(scope, &persisted).await {
            warn!("Failed to persist host statuses for {}: {}", scope, e);
        }

        metrics::histogram!("ringwatch_poll_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(PollResult {
            hosts: by_external,
            impacted_links: breaks.impacted_link_ids.into_iter().collect(),
            isolated_nodes: breaks.isolated_host_ids.into_iter().collect(),
        })
    }
}

/// Every sub-query failed and at least one because the backend refused our session
fn auth_blackout(snapshot: &TelemetrySnapshot) -> Option<TelemetryError> {
    if !snapshot.is_total_failure() {
        return None;
    }
    snapshot
        .failures
        .iter()
        .find(|f| matches!(f.error, TelemetryError::Auth(_)))
        .map(|f| f.error.clone())
}
