//! Telemetry Source Adapter
//!
//! Queries a Zabbix-style JSON-RPC monitoring API for host interface
//! availability, ICMP latency items and firing triggers. The three queries
//! for a poll run concurrently and fail independently; the caller gets
//! whatever succeeded plus the list of what failed.

mod client;
mod error;
mod records;
mod source;

pub use client::{Connection, TelemetryConfig, ZabbixClient};
pub use error::TelemetryError;
pub use records::{HostRecord, InterfaceState, LatencyProbe, TriggerProblem};
pub use source::{QueryFailure, SubQuery, TelemetrySnapshot, TelemetrySource};
