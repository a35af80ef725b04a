//! Alert Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::AlertError;

/// Template used when a rule does not specify one
pub const DEFAULT_DEDUPE_TEMPLATE: &str = "{{source}}:{{rule_id}}:{{triggerid}}";

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Map a backend severity name or number (0-5) onto the four levels
    pub fn from_backend(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "1" | "not classified" | "information" | "info" | "low" => Some(Severity::Low),
            "2" | "3" | "warning" | "average" | "medium" => Some(Severity::Medium),
            "4" | "high" => Some(Severity::High),
            "5" | "disaster" | "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::from_backend(s).ok_or_else(|| AlertError::Store(format!("invalid severity: {s}")))
    }
}

/// Lifecycle state of an alert instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Ack,
    Resolved,
}

impl AlertStatus {
    /// States in which an instance blocks a new open for its key
    pub const ACTIVE: &'static [AlertStatus] = &[AlertStatus::Open, AlertStatus::Ack];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Ack => "ack",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "ack" => Ok(AlertStatus::Ack),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(AlertError::Store(format!("invalid alert status: {other}"))),
        }
    }
}

/// Kind of transition recorded in the audit trail.
///
/// Refreshes update the instance in place and are never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Open,
    Ack,
    Resolve,
    AutoResolve,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "OPEN",
            EventKind::Ack => "ACK",
            EventKind::Resolve => "RESOLVE",
            EventKind::AutoResolve => "AUTO_RESOLVE",
        }
    }
}

impl FromStr for EventKind {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(EventKind::Open),
            "ACK" => Ok(EventKind::Ack),
            "RESOLVE" => Ok(EventKind::Resolve),
            "AUTO_RESOLVE" => Ok(EventKind::AutoResolve),
            other => Err(AlertError::Store(format!("invalid event kind: {other}"))),
        }
    }
}

/// Expected value of one event field: exact value, or any of a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    AnyOf(Vec<Value>),
    Exact(Value),
}

impl Matcher {
    pub fn accepts(&self, actual: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value_text(expected) == actual,
            Matcher::AnyOf(options) => options.iter().any(|o| value_text(o) == actual),
        }
    }
}

/// Textual form used for matching and templating
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Tenant rule deciding which events raise alerts and how they group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub tenant_id: String,
    pub source: String,
    pub is_enabled: bool,
    /// Field -> expected value(s); empty matches every event
    pub matchers: BTreeMap<String, Matcher>,
    pub dedupe_key_template: String,
    pub auto_resolve: bool,
}

/// Rule as submitted, before the store assigns an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub source: String,
    #[serde(default = "enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub matchers: BTreeMap<String, Matcher>,
    #[serde(default = "default_template")]
    pub dedupe_key_template: String,
    #[serde(default)]
    pub auto_resolve: bool,
}

fn enabled() -> bool {
    true
}

fn default_template() -> String {
    DEFAULT_DEDUPE_TEMPLATE.to_string()
}

impl NewRule {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            is_enabled: true,
            matchers: BTreeMap::new(),
            dedupe_key_template: default_template(),
            auto_resolve: false,
        }
    }

    pub fn into_rule(self, id: i64, tenant_id: &str) -> AlertRule {
        AlertRule {
            id,
            tenant_id: tenant_id.to_string(),
            source: self.source,
            is_enabled: self.is_enabled,
            matchers: self.matchers,
            dedupe_key_template: self.dedupe_key_template,
            auto_resolve: self.auto_resolve,
        }
    }
}

/// One alert for one underlying problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: i64,
    pub tenant_id: String,
    pub dedupe_key: String,
    pub status: AlertStatus,
    pub severity: Severity,
    pub rule_id: i64,
    /// Most recent event that touched this alert
    pub payload: Value,
    pub opened_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Audit-trail entry; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: i64,
    pub instance_id: i64,
    pub tenant_id: String,
    pub kind: EventKind,
    pub from_status: Option<AlertStatus>,
    pub to_status: AlertStatus,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Instance to open
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub tenant_id: String,
    pub dedupe_key: String,
    pub severity: Severity,
    pub rule_id: i64,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

impl NewAlert {
    pub fn into_instance(self, id: i64) -> AlertInstance {
        AlertInstance {
            id,
            tenant_id: self.tenant_id,
            dedupe_key: self.dedupe_key,
            status: AlertStatus::Open,
            severity: self.severity,
            rule_id: self.rule_id,
            payload: self.payload,
            opened_at: self.at,
            last_seen_at: self.at,
            resolved_at: None,
        }
    }
}
