//! Status Engine
//!
//! Turns raw telemetry into per-host status, then derives topology-level
//! consequences from it:
//! - ring breaks and isolated ring segments, recomputed on every poll
//! - effective status by reachability from the core of the network
//!
//! [`StatusPoller`] ties the pieces to the topology store, the telemetry
//! source and the result cache.

mod graph;
mod poller;
mod reachability;
mod resolver;
mod ring;

pub use poller::{PollResult, StatusPoller};
pub use reachability::{effective_statuses, EffectiveStatus, ReachabilityRow};
pub use resolver::resolve;
pub use ring::{detect_ring_breaks, RingBreakResult};

use telemetry::TelemetryError;
use thiserror::Error;
use topology::TopologyError;

/// Poll errors
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    /// The monitoring backend could not be used at all; retry later
    #[error("Monitoring backend unavailable: {0}")]
    Upstream(TelemetryError),
}

impl PollError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PollError::Topology(_) => false,
            PollError::Upstream(e) => e.is_retryable(),
        }
    }
}
