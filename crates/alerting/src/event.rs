//! Inbound Webhook Events

use crate::model::{value_text, Severity};
use crate::AlertError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Whether the event reports a problem or its recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Problem,
    Ok,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Problem => "PROBLEM",
            EventStatus::Ok => "OK",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PROBLEM" | "1" => Some(EventStatus::Problem),
            "OK" | "RESOLVED" | "0" => Some(EventStatus::Ok),
            _ => None,
        }
    }
}

/// Webhook body as delivered by the monitoring backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "triggerid", alias = "triggerId")]
    pub trigger_id: Option<Value>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub severity: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Pass-through correlation fields (map index, segment, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InboundEvent {
    /// Validate and normalize; `default_source` applies when the body names none
    pub fn normalize(self, default_source: &str) -> Result<NormalizedEvent, AlertError> {
        let trigger_id = self
            .trigger_id
            .as_ref()
            .map(value_text)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AlertError::InvalidEvent("missing triggerid".into()))?;
        let raw_status = self
            .status
            .as_ref()
            .map(value_text)
            .ok_or_else(|| AlertError::InvalidEvent("missing status".into()))?;
        let status = EventStatus::parse(&raw_status)
            .ok_or_else(|| AlertError::InvalidEvent(format!("unknown status {raw_status:?}")))?;

        let severity = match self.severity.as_ref().map(value_text) {
            Some(raw) => Severity::from_backend(&raw).unwrap_or_else(|| {
                warn!("Unmapped severity {:?} on trigger {}; using low", raw, trigger_id);
                Severity::Low
            }),
            None => Severity::Low,
        };

        Ok(NormalizedEvent {
            source: self
                .source
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_source.to_string()),
            trigger_id,
            host: self.host.unwrap_or_default(),
            severity,
            status,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            fields: self.extra,
        })
    }
}

/// Event in the shape the engine works with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub source: String,
    #[serde(rename = "triggerid")]
    pub trigger_id: String,
    pub host: String,
    pub severity: Severity,
    pub status: EventStatus,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl NormalizedEvent {
    /// Value of a named field as text, for matchers and dedup templates
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "source" => Some(self.source.clone()),
            "triggerid" | "trigger_id" | "triggerId" => Some(self.trigger_id.clone()),
            "host" => Some(self.host.clone()),
            "severity" => Some(self.severity.as_str().to_string()),
            "status" => Some(self.status.as_str().to_string()),
            "title" => Some(self.title.clone()),
            "description" => Some(self.description.clone()),
            other => self.fields.get(other).map(value_text),
        }
    }

    /// Snapshot stored on the alert and in the audit trail
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
