//! Backend Records
//!
//! The monitoring API encodes almost every scalar as a string. Parsing here is
//! lenient: anything that does not read as the expected number becomes `None`,
//! and a row without a usable id is dropped on its own.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Reported availability of one host interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    Available,
    Unavailable,
    Unknown,
}

impl InterfaceState {
    /// `available` field: 1 = available, 2 = unavailable, anything else unknown
    pub(crate) fn from_value(value: &Value) -> Self {
        match parse_i64(value) {
            Some(1) => InterfaceState::Available,
            Some(2) => InterfaceState::Unavailable,
            _ => InterfaceState::Unknown,
        }
    }
}

/// Host with its interfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub external_id: String,
    pub name: String,
    pub interfaces: Vec<InterfaceState>,
}

/// Latest ICMP latency sample for a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyProbe {
    pub external_id: String,
    pub latency_ms: Option<f64>,
    pub clock: Option<DateTime<Utc>>,
}

/// Trigger currently in problem state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerProblem {
    pub trigger_id: String,
    pub description: String,
    pub priority: Option<u8>,
    pub host_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHost {
    #[serde(default)]
    pub hostid: Value,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<RawInterface>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawInterface {
    #[serde(default)]
    pub available: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawItem {
    #[serde(default)]
    pub hostid: Value,
    #[serde(default)]
    pub lastvalue: Value,
    #[serde(default)]
    pub lastclock: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrigger {
    #[serde(default)]
    pub triggerid: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Value,
    #[serde(default)]
    pub hosts: Vec<RawHostRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHostRef {
    #[serde(default)]
    pub hostid: Value,
}

impl RawHost {
    pub(crate) fn into_record(self) -> Option<HostRecord> {
        let external_id = parse_id(&self.hostid)?;
        let name = if self.name.is_empty() { self.host } else { self.name };
        Some(HostRecord {
            external_id,
            name,
            interfaces: self
                .interfaces
                .iter()
                .map(|i| InterfaceState::from_value(&i.available))
                .collect(),
        })
    }
}

impl RawItem {
    pub(crate) fn into_probe(self) -> Option<LatencyProbe> {
        let external_id = parse_id(&self.hostid)?;
        // lastclock 0 means the item has never been collected
        let clock = parse_i64(&self.lastclock)
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        let latency_ms = clock
            .and_then(|_| parse_f64(&self.lastvalue))
            .filter(|v| *v >= 0.0)
            .map(|secs| secs * 1000.0);
        Some(LatencyProbe {
            external_id,
            latency_ms,
            clock,
        })
    }
}

impl RawTrigger {
    pub(crate) fn into_problem(self) -> Option<TriggerProblem> {
        Some(TriggerProblem {
            trigger_id: parse_id(&self.triggerid)?,
            description: self.description,
            priority: parse_i64(&self.priority).and_then(|p| u8::try_from(p).ok()),
            host_ids: self.hosts.iter().filter_map(|h| parse_id(&h.hostid)).collect(),
        })
    }
}

/// Decode result rows one by one, dropping the ones that do not fit
pub(crate) fn decode_rows<R, T>(method: &str, rows: Vec<Value>, convert: fn(R) -> Option<T>) -> Vec<T>
where
    R: DeserializeOwned,
{
    let total = rows.len();
    let records: Vec<T> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<R>(row).ok())
        .filter_map(convert)
        .collect();
    if records.len() < total {
        warn!("{}: skipped {} of {} malformed rows", method, total - records.len(), total);
    }
    records
}

/// Ids arrive as strings but some backends send bare numbers
pub(crate) fn parse_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub(crate) fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interface_availability_codes() {
        assert_eq!(InterfaceState::from_value(&json!("1")), InterfaceState::Available);
        assert_eq!(InterfaceState::from_value(&json!(2)), InterfaceState::Unavailable);
        assert_eq!(InterfaceState::from_value(&json!("0")), InterfaceState::Unknown);
        assert_eq!(InterfaceState::from_value(&json!("yes")), InterfaceState::Unknown);
    }

    #[test]
    fn test_latency_seconds_to_ms() {
        let raw: RawItem = serde_json::from_value(json!({
            "hostid": "10084",
            "lastvalue": "0.0125",
            "lastclock": "1700000000"
        }))
        .unwrap();
        let probe = raw.into_probe().unwrap();
        assert_eq!(probe.latency_ms, Some(12.5));
        assert_eq!(probe.clock.map(|c| c.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_malformed_latency_is_absent() {
        let raw: RawItem = serde_json::from_value(json!({
            "hostid": "10084",
            "lastvalue": "n/a",
            "lastclock": "1700000000"
        }))
        .unwrap();
        assert_eq!(raw.into_probe().unwrap().latency_ms, None);

        let never: RawItem = serde_json::from_value(json!({
            "hostid": "10084",
            "lastvalue": "0",
            "lastclock": "0"
        }))
        .unwrap();
        let probe = never.into_probe().unwrap();
        assert_eq!(probe.latency_ms, None);
        assert_eq!(probe.clock, None);
    }

    #[test]
    fn test_host_name_falls_back_to_technical_name() {
        let raw: RawHost = serde_json::from_value(json!({
            "hostid": "1",
            "host": "sw-core-01",
            "interfaces": [{"available": "1"}, {"available": "2"}]
        }))
        .unwrap();
        let host = raw.into_record().unwrap();
        assert_eq!(host.name, "sw-core-01");
        assert_eq!(
            host.interfaces,
            vec![InterfaceState::Available, InterfaceState::Unavailable]
        );
    }

    #[test]
    fn test_row_without_usable_id_is_dropped_alone() {
        let rows = vec![
            json!({ "hostid": "1", "name": "a", "interfaces": [{"available": "1"}] }),
            json!({ "name": "no id" }),
            json!({ "hostid": 7, "name": "numeric id" }),
            json!({ "hostid": "3", "interfaces": "garbage" }),
        ];
        let hosts = decode_rows("host.get", rows, RawHost::into_record);
        let ids: Vec<&str> = hosts.iter().map(|h| h.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "7"]);
    }

    #[test]
    fn test_trigger_keeps_readable_host_refs() {
        let raw: RawTrigger = serde_json::from_value(json!({
            "triggerid": 42,
            "description": "Uplink down",
            "hosts": [{ "hostid": "102" }, { "hostid": null }, { "hostid": 103 }]
        }))
        .unwrap();
        let problem = raw.into_problem().unwrap();
        assert_eq!(problem.trigger_id, "42");
        assert_eq!(problem.host_ids, vec!["102", "103"]);
    }
}
