//! Alert Persistence
//!
//! [`AlertStore`] implementations must guarantee at most one active
//! (open or ack) instance per (tenant, dedupe key), and must write an
//! instance change together with its audit event.

use crate::model::{
    AlertEvent, AlertInstance, AlertRule, AlertStatus, EventKind, NewAlert, NewRule, Severity,
};
use crate::AlertError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Mutex;

/// Result of trying to open a new instance
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Opened(AlertInstance),
    /// Another active instance holds the key
    AlreadyActive,
}

/// Which instance a transition applies to
#[derive(Debug, Clone, Copy)]
pub enum InstanceRef<'a> {
    Id(i64),
    /// The active instance for a dedupe key
    Active(&'a str),
}

/// Conditional status change plus the audit event it records
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: &'static [AlertStatus],
    pub to: AlertStatus,
    pub kind: EventKind,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_rule(&self, tenant_id: &str, rule: NewRule) -> Result<AlertRule, AlertError>;

    /// Rules of one tenant, optionally limited to one source, ascending id
    async fn rules(&self, tenant_id: &str, source: Option<&str>) -> Result<Vec<AlertRule>, AlertError>;

    /// Update the active instance for a key in place, if there is one
    async fn refresh(
        &self,
        tenant_id: &str,
        dedupe_key: &str,
        severity: Severity,
        payload: &Value,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>, AlertError>;

    /// Insert an open instance and its OPEN event
    async fn open(&self, alert: NewAlert) -> Result<OpenOutcome, AlertError>;

    /// Apply `transition` if the instance is in one of `transition.from`;
    /// `None` when there is no such instance in an allowed state
    async fn transition(
        &self,
        tenant_id: &str,
        target: InstanceRef<'_>,
        transition: Transition,
    ) -> Result<Option<AlertInstance>, AlertError>;

    async fn instance(&self, tenant_id: &str, id: i64) -> Result<Option<AlertInstance>, AlertError>;

    /// Instances of a tenant, newest first
    async fn instances(
        &self,
        tenant_id: &str,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertInstance>, AlertError>;

    /// Audit trail of one instance, oldest first
    async fn events(&self, tenant_id: &str, instance_id: i64) -> Result<Vec<AlertEvent>, AlertError>;
}

#[derive(Default)]
struct State {
    rules: Vec<AlertRule>,
    instances: Vec<AlertInstance>,
    events: Vec<AlertEvent>,
    next_rule_id: i64,
    next_instance_id: i64,
    next_event_id: i64,
}

impl State {
    fn push_event(
        &mut self,
        instance: &AlertInstance,
        kind: EventKind,
        from_status: Option<AlertStatus>,
        payload: Value,
        at: DateTime<Utc>,
    ) {
        self.next_event_id += 1;
        self.events.push(AlertEvent {
            id: self.next_event_id,
            instance_id: instance.id,
            tenant_id: instance.tenant_id.clone(),
            kind,
            from_status,
            to_status: instance.status,
            payload,
            created_at: at,
        });
    }

    fn active_mut(&mut self, tenant_id: &str, dedupe_key: &str) -> Option<&mut AlertInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.tenant_id == tenant_id && i.dedupe_key == dedupe_key && i.status.is_active())
    }
}

/// In-memory store for tests and single-process deployments
#[derive(Default)]
pub struct MemoryAlertStore {
    state: Mutex<State>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, AlertError> {
        self.state
            .lock()
            .map_err(|e| AlertError::Store(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create_rule(&self, tenant_id: &str, rule: NewRule) -> Result<AlertRule, AlertError> {
        let mut state = self.lock()?;
        state.next_rule_id += 1;
        let rule = rule.into_rule(state.next_rule_id, tenant_id);
        state.rules.push(rule.clone());
        Ok(rule)
    }

    async fn rules(&self, tenant_id: &str, source: Option<&str>) -> Result<Vec<AlertRule>, AlertError> {
        let state = self.lock()?;
        let mut rules: Vec<AlertRule> = state
            .rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id && source.map_or(true, |s| r.source == s))
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn refresh(
        &self,
        tenant_id: &str,
        dedupe_key: &str,
        severity: Severity,
        payload: &Value,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>, AlertError> {
        let mut state = self.lock()?;
        Ok(state.active_mut(tenant_id, dedupe_key).map(|instance| {
            instance.severity = severity;
            instance.payload = payload.clone();
            instance.last_seen_at = seen_at;
            instance.clone()
        }))
    }

    async fn open(&self, alert: NewAlert) -> Result<OpenOutcome, AlertError> {
        let mut state = self.lock()?;
        if state.active_mut(&alert.tenant_id, &alert.dedupe_key).is_some() {
            return Ok(OpenOutcome::AlreadyActive);
        }
        state.next_instance_id += 1;
        let at = alert.at;
        let payload = alert.payload.clone();
        let instance = alert.into_instance(state.next_instance_id);
        state.instances.push(instance.clone());
        state.push_event(&instance, EventKind::Open, None, payload, at);
        Ok(OpenOutcome::Opened(instance))
    }

    async fn transition(
        &self,
        tenant_id: &str,
        target: InstanceRef<'_>,
        transition: Transition,
    ) -> Result<Option<AlertInstance>, AlertError> {
        let mut state = self.lock()?;
        let found = state.instances.iter_mut().find(|i| {
            i.tenant_id == tenant_id
                && transition.from.contains(&i.status)
                && match target {
                    InstanceRef::Id(id) => i.id == id,
                    InstanceRef::Active(key) => i.dedupe_key == key,
                }
        });
        let Some(instance) = found else {
            return Ok(None);
        };

        let from_status = instance.status;
        instance.status = transition.to;
        if transition.to == AlertStatus::Resolved {
            instance.resolved_at = Some(transition.at);
        }
        let instance = instance.clone();
        state.push_event(
            &instance,
            transition.kind,
            Some(from_status),
            transition.payload,
            transition.at,
        );
        Ok(Some(instance))
    }

    async fn instance(&self, tenant_id: &str, id: i64) -> Result<Option<AlertInstance>, AlertError> {
        let state = self.lock()?;
        Ok(state
            .instances
            .iter()
            .find(|i| i.tenant_id == tenant_id && i.id == id)
            .cloned())
    }

    async fn instances(
        &self,
        tenant_id: &str,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertInstance>, AlertError> {
        let state = self.lock()?;
        Ok(state
            .instances
            .iter()
            .rev()
            .filter(|i| i.tenant_id == tenant_id && status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn events(&self, tenant_id: &str, instance_id: i64) -> Result<Vec<AlertEvent>, AlertError> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.instance_id == instance_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_alert(key: &str) -> NewAlert {
        NewAlert {
            tenant_id: "acme".into(),
            dedupe_key: key.into(),
            severity: Severity::High,
            rule_id: 1,
            payload: json!({ "triggerid": "42" }),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_second_open_for_active_key_conflicts() {
        let store = MemoryAlertStore::new();
        assert!(matches!(store.open(new_alert("k")).await.unwrap(), OpenOutcome::Opened(_)));
        assert_eq!(store.open(new_alert("k")).await.unwrap(), OpenOutcome::AlreadyActive);
        assert!(matches!(store.open(new_alert("other")).await.unwrap(), OpenOutcome::Opened(_)));
    }

    #[tokio::test]
    async fn test_resolved_key_can_reopen() {
        let store = MemoryAlertStore::new();
        store.open(new_alert("k")).await.unwrap();
        let resolved = store
            .transition(
                "acme",
                InstanceRef::Active("k"),
                Transition {
                    from: AlertStatus::ACTIVE,
                    to: AlertStatus::Resolved,
                    kind: EventKind::AutoResolve,
                    payload: json!({}),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(resolved.resolved_at.is_some());

        let OpenOutcome::Opened(second) = store.open(new_alert("k")).await.unwrap() else {
            panic!("expected reopen");
        };
        assert_ne!(second.id, resolved.id);

        let trail = store.events("acme", resolved.id).await.unwrap();
        let kinds: Vec<EventKind> = trail.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Open, EventKind::AutoResolve]);
        assert_eq!(trail[1].from_status, Some(AlertStatus::Open));
    }

    #[tokio::test]
    async fn test_transition_respects_from_states() {
        let store = MemoryAlertStore::new();
        let OpenOutcome::Opened(instance) = store.open(new_alert("k")).await.unwrap() else {
            panic!("expected open");
        };
        let ack_only_from_resolved = Transition {
            from: &[AlertStatus::Resolved],
            to: AlertStatus::Ack,
            kind: EventKind::Ack,
            payload: Value::Null,
            at: Utc::now(),
        };
        let none = store
            .transition("acme", InstanceRef::Id(instance.id), ack_only_from_resolved)
            .await
            .unwrap();
        assert!(none.is_none());
        assert_eq!(store.events("acme", instance.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemoryAlertStore::new();
        store.open(new_alert("k")).await.unwrap();
        assert!(store.instances("globex", None).await.unwrap().is_empty());
        assert!(store
            .refresh("globex", "k", Severity::Low, &json!({}), Utc::now())
            .await
            .unwrap()
            .is_none());
    }
}
