//! Alert Manager Implementation
//!
//! event -> rule -> dedupe key -> open / refresh / auto-resolve

use crate::event::{EventStatus, NormalizedEvent};
use crate::model::{AlertInstance, AlertStatus, EventKind, NewAlert};
use crate::notify::{Notification, NotificationSink};
use crate::rules::select_rule;
use crate::store::{AlertStore, InstanceRef, OpenOutcome, Transition};
use crate::template::render_dedupe_key;
use crate::AlertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Source assumed when a webhook body names none
    pub default_source: String,
    /// Refresh/open rounds before giving up on a contended key
    pub max_open_attempts: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_source: "zabbix".to_string(),
            max_open_attempts: 3,
        }
    }
}

/// What processing an event did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlertOutcome {
    Opened { alert: AlertInstance },
    Refreshed { alert: AlertInstance },
    AutoResolved { alert: AlertInstance },
    /// Recovery for a rule without auto-resolve; the alert stays as it is
    ManualResolutionRequired { rule_id: i64, dedupe_key: String },
    /// Recovery with nothing active to resolve
    NoActiveAlert { dedupe_key: String },
    NoMatchingRule,
}

impl AlertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertOutcome::Opened { .. } => "opened",
            AlertOutcome::Refreshed { .. } => "refreshed",
            AlertOutcome::AutoResolved { .. } => "auto_resolved",
            AlertOutcome::ManualResolutionRequired { .. } => "manual_resolution_required",
            AlertOutcome::NoActiveAlert { .. } => "no_active_alert",
            AlertOutcome::NoMatchingRule => "no_matching_rule",
        }
    }
}

/// Alert manager for rule matching, deduplication and lifecycle
pub struct AlertManager {
    config: AlertConfig,
    store: Arc<dyn AlertStore>,
    sink: Arc<dyn NotificationSink>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig, store: Arc<dyn AlertStore>, sink: Arc<dyn NotificationSink>) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self { config, store, sink }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AlertStore> {
        &self.store
    }

    pub async fn process(&self, tenant_id: &str, event: &NormalizedEvent) -> Result<AlertOutcome, AlertError> {
        self.process_at(tenant_id, event, Utc::now()).await
    }

    /// Process one event as if received at `at`
    pub async fn process_at(
        &self,
        tenant_id: &str,
        event: &NormalizedEvent,
        at: DateTime<Utc>,
    ) -> Result<AlertOutcome, AlertError> {
        let rules = self.store.rules(tenant_id, Some(&event.source)).await?;
        let Some(rule) = select_rule(&rules, event) else {
            debug!(
                "No rule for {} event {} (tenant {})",
                event.source, event.trigger_id, tenant_id
            );
            return Ok(AlertOutcome::NoMatchingRule);
        };
        let dedupe_key = render_dedupe_key(rule, event);
        let payload = event.payload();

        let outcome = match event.status {
            EventStatus::Problem => {
                self.raise(tenant_id, rule.id, &dedupe_key, event, payload, at)
                    .await?
            }
            EventStatus::Ok if !rule.auto_resolve => {
                debug!("Rule {} does not auto-resolve; leaving {} as is", rule.id, dedupe_key);
                AlertOutcome::ManualResolutionRequired {
                    rule_id: rule.id,
                    dedupe_key,
                }
            }
            EventStatus::Ok => {
                let transition = Transition {
                    from: AlertStatus::ACTIVE,
                    to: AlertStatus::Resolved,
                    kind: EventKind::AutoResolve,
                    payload,
                    at,
                };
                match self
                    .store
                    .transition(tenant_id, InstanceRef::Active(&dedupe_key), transition)
                    .await?
                {
                    Some(alert) => {
                        info!("Alert {} auto-resolved ({})", alert.id, dedupe_key);
                        self.sink.dispatch(Notification::resolved(&alert, &headline(event)));
                        AlertOutcome::AutoResolved { alert }
                    }
                    None => AlertOutcome::NoActiveAlert { dedupe_key },
                }
            }
        };

        metrics::counter!("ringwatch_alert_transitions_total", "kind" => outcome.as_str()).increment(1);
        Ok(outcome)
    }

    /// Refresh the active instance, or open one; a lost open race becomes a refresh
    async fn raise(
        &self,
        tenant_id: &str,
        rule_id: i64,
        dedupe_key: &str,
        event: &NormalizedEvent,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<AlertOutcome, AlertError> {
        for attempt in 1..=self.config.max_open_attempts {
            if let Some(alert) = self
                .store
                .refresh(tenant_id, dedupe_key, event.severity, &payload, at)
                .await?
            {
                debug!("Alert {} refreshed ({})", alert.id, dedupe_key);
                return Ok(AlertOutcome::Refreshed { alert });
            }

            let new = NewAlert {
                tenant_id: tenant_id.to_string(),
                dedupe_key: dedupe_key.to_string(),
                severity: event.severity,
                rule_id,
                payload: payload.clone(),
                at,
            };
            match self.store.open(new).await? {
                OpenOutcome::Opened(alert) => {
                    info!("Alert {} opened ({}, {})", alert.id, dedupe_key, alert.severity);
                    self.sink
                        .dispatch(Notification::opened(&alert, &headline(event), &details(event)));
                    return Ok(AlertOutcome::Opened { alert });
                }
                OpenOutcome::AlreadyActive => {
                    debug!("Lost open race for {} (attempt {}); retrying as refresh", dedupe_key, attempt);
                }
            }
        }
        warn!("Alert key {} stayed contended after {} attempts", dedupe_key, self.config.max_open_attempts);
        Err(AlertError::Contention(dedupe_key.to_string()))
    }

    /// Operator acknowledgement; only an open alert can be acknowledged
    pub async fn acknowledge(&self, tenant_id: &str, id: i64) -> Result<AlertInstance, AlertError> {
        self.manual(tenant_id, id, &[AlertStatus::Open], AlertStatus::Ack, EventKind::Ack, "acknowledge")
            .await
    }

    /// Operator resolution of an open or acknowledged alert
    pub async fn resolve(&self, tenant_id: &str, id: i64) -> Result<AlertInstance, AlertError> {
        let alert = self
            .manual(tenant_id, id, AlertStatus::ACTIVE, AlertStatus::Resolved, EventKind::Resolve, "resolve")
            .await?;
        let title = alert
            .payload
            .get("title")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(&alert.dedupe_key)
            .to_string();
        self.sink.dispatch(Notification::resolved(&alert, &title));
        Ok(alert)
    }

    async fn manual(
        &self,
        tenant_id: &str,
        id: i64,
        from: &'static [AlertStatus],
        to: AlertStatus,
        kind: EventKind,
        action: &'static str,
    ) -> Result<AlertInstance, AlertError> {
        let transition = Transition {
            from,
            to,
            kind,
            payload: json!({ "actor": "operator" }),
            at: Utc::now(),
        };
        if let Some(alert) = self.store.transition(tenant_id, InstanceRef::Id(id), transition).await? {
            info!("Alert {} {} by operator", alert.id, to);
            metrics::counter!("ringwatch_alert_transitions_total", "kind" => action).increment(1);
            return Ok(alert);
        }
        match self.store.instance(tenant_id, id).await? {
            Some(current) => Err(AlertError::InvalidTransition {
                id,
                status: current.status,
                action,
            }),
            None => Err(AlertError::NotFound(id)),
        }
    }
}

fn headline(event: &NormalizedEvent) -> String {
    if event.title.is_empty() {
        format!("Trigger {} on {}", event.trigger_id, event.host)
    } else {
        event.title.clone()
    }
}

fn details(event: &NormalizedEvent) -> String {
    match (event.host.is_empty(), event.description.is_empty()) {
        (true, true) => String::new(),
        (false, true) => format!("Host: {}", event.host),
        (true, false) => event.description.clone(),
        (false, false) => format!("Host: {}\n{}", event.host, event.description),
    }
}
