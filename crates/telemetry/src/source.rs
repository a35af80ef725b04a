//! Telemetry Source Contract

use crate::client::{Connection, ZabbixClient};
use crate::error::TelemetryError;
use crate::records::{HostRecord, LatencyProbe, TriggerProblem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The three independent queries issued per poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubQuery {
    Hosts,
    Latency,
    Problems,
}

impl SubQuery {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubQuery::Hosts => "hosts",
            SubQuery::Latency => "latency",
            SubQuery::Problems => "problems",
        }
    }
}

impl fmt::Display for SubQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sub-query that did not produce data
#[derive(Debug, Clone)]
pub struct QueryFailure {
    pub query: SubQuery,
    pub error: TelemetryError,
}

/// Result of one fetch, keyed by external host id
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub hosts: HashMap<String, HostRecord>,
    pub latency: HashMap<String, LatencyProbe>,
    pub problems: HashMap<String, Vec<TriggerProblem>>,
    pub failures: Vec<QueryFailure>,
}

impl TelemetrySnapshot {
    pub fn has_problem(&self, external_id: &str) -> bool {
        self.problems
            .get(external_id)
            .is_some_and(|problems| !problems.is_empty())
    }

    pub fn failed(&self, query: SubQuery) -> bool {
        self.failures.iter().any(|f| f.query == query)
    }

    /// Every sub-query failed
    pub fn is_total_failure(&self) -> bool {
        [SubQuery::Hosts, SubQuery::Latency, SubQuery::Problems]
            .iter()
            .all(|q| self.failed(*q))
    }

    pub(crate) fn record_hosts(&mut self, hosts: Vec<HostRecord>) {
        for host in hosts {
            self.hosts.insert(host.external_id.clone(), host);
        }
    }

    /// Keeps the most recent sample when a host has several latency items
    pub(crate) fn record_latency(&mut self, probes: Vec<LatencyProbe>) {
        for probe in probes {
            match self.latency.get(&probe.external_id) {
                Some(existing) if existing.clock >= probe.clock => {}
                _ => {
                    self.latency.insert(probe.external_id.clone(), probe);
                }
            }
        }
    }

    pub(crate) fn record_problems(&mut self, problems: Vec<TriggerProblem>) {
        for problem in problems {
            for host_id in &problem.host_ids {
                self.problems
                    .entry(host_id.clone())
                    .or_default()
                    .push(problem.clone());
            }
        }
    }

    fn record_failure(&mut self, query: SubQuery, error: TelemetryError) {
        warn!("Telemetry {} query failed: {}", query, error);
        self.failures.push(QueryFailure { query, error });
    }
}

/// Source of raw liveness signals for a batch of hosts
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch all three signal sets; never fails as a whole
    async fn fetch(
        &self,
        conn: &Connection,
        host_ids: &[String],
        deadline: Instant,
    ) -> TelemetrySnapshot;
}

#[async_trait]
impl TelemetrySource for ZabbixClient {
    async fn fetch(
        &self,
        conn: &Connection,
        host_ids: &[String],
        deadline: Instant,
    ) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::default();
        if host_ids.is_empty() {
            return snapshot;
        }

        let (hosts, latency, problems) = tokio::join!(
            self.fetch_hosts(conn, host_ids, deadline),
            self.fetch_latency(conn, host_ids, deadline),
            self.fetch_problems(conn, host_ids, deadline),
        );

        match hosts {
            Ok(hosts) => snapshot.record_hosts(hosts),
            Err(e) => snapshot.record_failure(SubQuery::Hosts, e),
        }
        match latency {
            Ok(probes) => snapshot.record_latency(probes),
            Err(e) => snapshot.record_failure(SubQuery::Latency, e),
        }
        match problems {
            Ok(problems) => snapshot.record_problems(problems),
            Err(e) => snapshot.record_failure(SubQuery::Problems, e),
        }

        debug!(
            "Fetched {} hosts, {} latency probes, {} hosts with problems ({} failures)",
            snapshot.hosts.len(),
            snapshot.latency.len(),
            snapshot.problems.len(),
            snapshot.failures.len()
        );
        snapshot
    }
}
