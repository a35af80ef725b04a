//! Alert Tables
//!
//! The partial unique index on active keys makes `open` race-safe across
//! connections and processes; a losing insert surfaces as
//! [`OpenOutcome::AlreadyActive`].

use crate::sqlite::{from_millis, to_millis, SqliteStore};
use crate::{is_unique_violation, StorageError};
use alerting::{
    AlertError, AlertEvent, AlertInstance, AlertRule, AlertStatus, AlertStore, EventKind, InstanceRef,
    NewAlert, NewRule, OpenOutcome, Severity, Transition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::debug;

const INSTANCE_COLUMNS: &str =
    "id, tenant_id, dedupe_key, status, severity, rule_id, payload, opened_at, last_seen_at, resolved_at";

impl SqliteStore {
    async fn insert_rule(&self, tenant_id: &str, rule: NewRule) -> Result<AlertRule, StorageError> {
        let matchers = serde_json::to_string(&rule.matchers)?;
        let result = sqlx::query(
            "INSERT INTO alert_rules (tenant_id, source, is_enabled, matchers, dedupe_key_template, auto_resolve) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(&rule.source)
        .bind(rule.is_enabled)
        .bind(matchers)
        .bind(&rule.dedupe_key_template)
        .bind(rule.auto_resolve)
        .execute(&self.pool)
        .await?;
        Ok(rule.into_rule(result.last_insert_rowid(), tenant_id))
    }

    async fn select_rules(&self, tenant_id: &str, source: Option<&str>) -> Result<Vec<AlertRule>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, source, is_enabled, matchers, dedupe_key_template, auto_resolve \
             FROM alert_rules WHERE tenant_id = ? AND (? IS NULL OR source = ?) ORDER BY id",
        )
        .bind(tenant_id)
        .bind(source)
        .bind(source)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rule_from_row).collect()
    }

    async fn refresh_active(
        &self,
        tenant_id: &str,
        dedupe_key: &str,
        severity: Severity,
        payload: &Value,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>, StorageError> {
        let sql = format!(
            "UPDATE alert_instances SET severity = ?, payload = ?, last_seen_at = ? \
             WHERE tenant_id = ? AND dedupe_key = ? AND status IN ('open', 'ack') \
             RETURNING {INSTANCE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(severity.as_str())
            .bind(serde_json::to_string(payload)?)
            .bind(to_millis(seen_at))
            .bind(tenant_id)
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn insert_open(&self, alert: NewAlert) -> Result<OpenOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;
        let payload = serde_json::to_string(&alert.payload)?;
        let inserted = sqlx::query(
            "INSERT INTO alert_instances (tenant_id, dedupe_key, status, severity, rule_id, payload, opened_at, last_seen_at) \
             VALUES (?, ?, 'open', ?, ?, ?, ?, ?)",
        )
        .bind(&alert.tenant_id)
        .bind(&alert.dedupe_key)
        .bind(alert.severity.as_str())
        .bind(alert.rule_id)
        .bind(&payload)
        .bind(to_millis(alert.at))
        .bind(to_millis(alert.at))
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                debug!("Active instance already holds {}", alert.dedupe_key);
                return Ok(OpenOutcome::AlreadyActive);
            }
            Err(e) => return Err(e.into()),
        };

        let instance = alert.into_instance(id);
        insert_event(&mut tx, &instance, EventKind::Open, None, &instance.payload, instance.opened_at).await?;
        tx.commit().await?;
        Ok(OpenOutcome::Opened(instance))
    }

    async fn apply_transition(
        &self,
        tenant_id: &str,
        target: InstanceRef<'_>,
        transition: Transition,
    ) -> Result<Option<AlertInstance>, StorageError> {
        let filter = match target {
            InstanceRef::Id(_) => "id = ?",
            InstanceRef::Active(_) => "dedupe_key = ?",
        };
        let sql = format!(
            "UPDATE alert_instances SET status = ?, resolved_at = ? \
             WHERE tenant_id = ? AND {filter} AND status = ? \
             RETURNING {INSTANCE_COLUMNS}"
        );
        let resolved_at = (transition.to == AlertStatus::Resolved).then(|| to_millis(transition.at));

        let mut tx = self.pool.begin().await?;
        // one guarded update per allowed source state, so the event records
        // the state actually left
        for from in transition.from {
            let query = sqlx::query(&sql)
                .bind(transition.to.as_str())
                .bind(resolved_at)
                .bind(tenant_id);
            let query = match target {
                InstanceRef::Id(id) => query.bind(id),
                InstanceRef::Active(key) => query.bind(key),
            };
            let Some(row) = query.bind(from.as_str()).fetch_optional(&mut *tx).await? else {
                continue;
            };

            let instance = instance_from_row(&row)?;
            insert_event(
                &mut tx,
                &instance,
                transition.kind,
                Some(*from),
                &transition.payload,
                transition.at,
            )
            .await?;
            tx.commit().await?;
            return Ok(Some(instance));
        }
        Ok(None)
    }

    async fn select_instance(&self, tenant_id: &str, id: i64) -> Result<Option<AlertInstance>, StorageError> {
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM alert_instances WHERE tenant_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn select_instances(
        &self,
        tenant_id: &str,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertInstance>, StorageError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM alert_instances \
             WHERE tenant_id = ? AND (? IS NULL OR status = ?) ORDER BY id DESC"
        );
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(instance_from_row).collect()
    }

    async fn select_events(&self, tenant_id: &str, instance_id: i64) -> Result<Vec<AlertEvent>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, instance_id, tenant_id, kind, from_status, to_status, payload, created_at \
             FROM alert_events WHERE tenant_id = ? AND instance_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}

async fn insert_event(
    conn: &mut SqliteConnection,
    instance: &AlertInstance,
    kind: EventKind,
    from_status: Option<AlertStatus>,
    payload: &Value,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO alert_events (instance_id, tenant_id, kind, from_status, to_status, payload, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(instance.id)
    .bind(&instance.tenant_id)
    .bind(kind.as_str())
    .bind(from_status.map(|s| s.as_str()))
    .bind(instance.status.as_str())
    .bind(serde_json::to_string(payload)?)
    .bind(to_millis(at))
    .execute(conn)
    .await?;
    Ok(())
}

fn parse<T: FromStr<Err = AlertError>>(raw: &str) -> Result<T, StorageError> {
    T::from_str(raw).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn rule_from_row(row: &SqliteRow) -> Result<AlertRule, StorageError> {
    let matchers: String = row.try_get("matchers")?;
    Ok(AlertRule {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        source: row.try_get("source")?,
        is_enabled: row.try_get("is_enabled")?,
        matchers: serde_json::from_str(&matchers)?,
        dedupe_key_template: row.try_get("dedupe_key_template")?,
        auto_resolve: row.try_get("auto_resolve")?,
    })
}

fn instance_from_row(row: &SqliteRow) -> Result<AlertInstance, StorageError> {
    let status: String = row.try_get("status")?;
    let severity: String = row.try_get("severity")?;
    let payload: String = row.try_get("payload")?;
    let resolved_at: Option<i64> = row.try_get("resolved_at")?;
    Ok(AlertInstance {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        dedupe_key: row.try_get("dedupe_key")?,
        status: parse(&status)?,
        severity: parse(&severity)?,
        rule_id: row.try_get("rule_id")?,
        payload: serde_json::from_str(&payload)?,
        opened_at: from_millis(row.try_get("opened_at")?)?,
        last_seen_at: from_millis(row.try_get("last_seen_at")?)?,
        resolved_at: resolved_at.map(from_millis).transpose()?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<AlertEvent, StorageError> {
    let kind: String = row.try_get("kind")?;
    let from_status: Option<String> = row.try_get("from_status")?;
    let to_status: String = row.try_get("to_status")?;
    let payload: String = row.try_get("payload")?;
    Ok(AlertEvent {
        id: row.try_get("id")?,
        instance_id: row.try_get("instance_id")?,
        tenant_id: row.try_get("tenant_id")?,
        kind: parse(&kind)?,
        from_status: from_status.as_deref().map(parse).transpose()?,
        to_status: parse(&to_status)?,
        payload: serde_json::from_str(&payload)?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn create_rule(&self, tenant_id: &str, rule: NewRule) -> Result<AlertRule, AlertError> {
        Ok(self.insert_rule(tenant_id, rule).await?)
    }

    async fn rules(&self, tenant_id: &str, source: Option<&str>) -> Result<Vec<AlertRule>, AlertError> {
        Ok(self.select_rules(tenant_id, source).await?)
    }

    async fn refresh(
        &self,
        tenant_id: &str,
        dedupe_key: &str,
        severity: Severity,
        payload: &Value,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>, AlertError> {
        Ok(self
            .refresh_active(tenant_id, dedupe_key, severity, payload, seen_at)
            .await?)
    }

    async fn open(&self, alert: NewAlert) -> Result<OpenOutcome, AlertError> {
        Ok(self.insert_open(alert).await?)
    }

    async fn transition(
        &self,
        tenant_id: &str,
        target: InstanceRef<'_>,
        transition: Transition,
    ) -> Result<Option<AlertInstance>, AlertError> {
        Ok(self.apply_transition(tenant_id, target, transition).await?)
    }

    async fn instance(&self, tenant_id: &str, id: i64) -> Result<Option<AlertInstance>, AlertError> {
        Ok(self.select_instance(tenant_id, id).await?)
    }

    async fn instances(
        &self,
        tenant_id: &str,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertInstance>, AlertError> {
        Ok(self.select_instances(tenant_id, status).await?)
    }

    async fn events(&self, tenant_id: &str, instance_id: i64) -> Result<Vec<AlertEvent>, AlertError> {
        Ok(self.select_events(tenant_id, instance_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseConfig;
    use alerting::{AlertConfig, AlertManager, AlertOutcome, ChannelSink, InboundEvent, Matcher};
    use serde_json::json;
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::connect(&DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    fn new_alert(rule_id: i64, key: &str) -> NewAlert {
        NewAlert {
            tenant_id: "acme".into(),
            dedupe_key: key.into(),
            severity: Severity::High,
            rule_id,
            payload: json!({ "triggerid": "42" }),
            at: Utc::now(),
        }
    }

    fn event(status: &str) -> alerting::NormalizedEvent {
        let inbound: InboundEvent = serde_json::from_value(json!({
            "triggerid": "42", "host": "ring-b", "status": status, "severity": "High",
            "title": "Unavailable by ICMP ping"
        }))
        .unwrap();
        inbound.normalize("zabbix").unwrap()
    }

    #[tokio::test]
    async fn test_rules_round_trip_in_id_order() {
        let store = store().await;
        let mut first = NewRule::new("zabbix");
        first
            .matchers
            .insert("severity".into(), Matcher::AnyOf(vec![json!("high"), json!("critical")]));
        store.create_rule("acme", first).await.unwrap();
        store.create_rule("acme", NewRule::new("prometheus")).await.unwrap();
        store.create_rule("acme", NewRule::new("zabbix")).await.unwrap();

        let rules = store.rules("acme", Some("zabbix")).await.unwrap();
        assert_eq!(rules.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            rules[0].matchers["severity"],
            Matcher::AnyOf(vec![json!("high"), json!("critical")])
        );
        assert_eq!(store.rules("acme", None).await.unwrap().len(), 3);
        assert!(store.rules("globex", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unique_index_rejects_second_active_row() {
        let store = store().await;
        let rule = store.create_rule("acme", NewRule::new("zabbix")).await.unwrap();
        let insert = "INSERT INTO alert_instances (tenant_id, dedupe_key, status, severity, rule_id, payload, opened_at, last_seen_at) \
                      VALUES ('acme', 'k', ?, 'high', ?, '{}', 0, 0)";

        sqlx::query(insert).bind("open").bind(rule.id).execute(store.pool()).await.unwrap();
        let err = sqlx::query(insert)
            .bind("ack")
            .bind(rule.id)
            .execute(store.pool())
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
        // resolved rows are outside the index
        sqlx::query(insert).bind("resolved").bind(rule.id).execute(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_conflict_and_reopen() {
        let store = store().await;
        let rule = store.create_rule("acme", NewRule::new("zabbix")).await.unwrap();

        let OpenOutcome::Opened(first) = store.open(new_alert(rule.id, "k")).await.unwrap() else {
            panic!("expected open");
        };
        assert_eq!(store.open(new_alert(rule.id, "k")).await.unwrap(), OpenOutcome::AlreadyActive);

        let resolved = store
            .transition(
                "acme",
                InstanceRef::Active("k"),
                Transition {
                    from: AlertStatus::ACTIVE,
                    to: AlertStatus::Resolved,
                    kind: EventKind::AutoResolve,
                    payload: json!({ "status": "OK" }),
                    at: Utc::now(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, first.id);
        assert!(resolved.resolved_at.is_some());

        assert!(matches!(
            store.open(new_alert(rule.id, "k")).await.unwrap(),
            OpenOutcome::Opened(_)
        ));

        let trail = store.events("acme", first.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].kind, EventKind::Open);
        assert_eq!(trail[0].from_status, None);
        assert_eq!(trail[1].kind, EventKind::AutoResolve);
        assert_eq!(trail[1].from_status, Some(AlertStatus::Open));
        assert_eq!(trail[1].to_status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn test_transition_records_state_left() {
        let store = store().await;
        let rule = store.create_rule("acme", NewRule::new("zabbix")).await.unwrap();
        let OpenOutcome::Opened(alert) = store.open(new_alert(rule.id, "k")).await.unwrap() else {
            panic!("expected open");
        };
        let step = |from: &'static [AlertStatus], to, kind| Transition {
            from,
            to,
            kind,
            payload: Value::Null,
            at: Utc::now(),
        };

        store
            .transition("acme", InstanceRef::Id(alert.id), step(&[AlertStatus::Open], AlertStatus::Ack, EventKind::Ack))
            .await
            .unwrap()
            .unwrap();
        let resolved = store
            .transition(
                "acme",
                InstanceRef::Id(alert.id),
                step(AlertStatus::ACTIVE, AlertStatus::Resolved, EventKind::Resolve),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);

        let again = store
            .transition(
                "acme",
                InstanceRef::Id(alert.id),
                step(AlertStatus::ACTIVE, AlertStatus::Resolved, EventKind::Resolve),
            )
            .await
            .unwrap();
        assert!(again.is_none());

        let trail = store.events("acme", alert.id).await.unwrap();
        assert_eq!(trail[2].from_status, Some(AlertStatus::Ack));
        assert_eq!(trail.len(), 3);
    }

    #[tokio::test]
    async fn test_manager_lifecycle_on_sqlite() {
        let store = Arc::new(store().await);
        let mut rule = NewRule::new("zabbix");
        rule.dedupe_key_template = "{{source}}:{{triggerid}}".into();
        rule.auto_resolve = true;
        store.create_rule("acme", rule).await.unwrap();
        let (sink, _rx) = ChannelSink::new();
        let manager = AlertManager::new(AlertConfig::default(), store.clone(), Arc::new(sink));

        let t0 = Utc::now();
        let opened = manager.process_at("acme", &event("PROBLEM"), t0).await.unwrap();
        let AlertOutcome::Opened { alert } = opened else {
            panic!("expected open");
        };
        for n in 1..=5 {
            let at = t0 + chrono::Duration::seconds(n);
            let outcome = manager.process_at("acme", &event("PROBLEM"), at).await.unwrap();
            let AlertOutcome::Refreshed { alert: refreshed } = outcome else {
                panic!("expected refresh");
            };
            assert_eq!(refreshed.id, alert.id);
            assert_eq!(refreshed.last_seen_at.timestamp_millis(), at.timestamp_millis());
        }
        let resolved = manager.process("acme", &event("OK")).await.unwrap();
        assert!(matches!(resolved, AlertOutcome::AutoResolved { .. }));

        let kinds: Vec<EventKind> = store
            .events("acme", alert.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::Open, EventKind::AutoResolve]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_open_once() {
        let store = Arc::new(store().await);
        store.create_rule("acme", NewRule::new("zabbix")).await.unwrap();
        let (sink, _rx) = ChannelSink::new();
        let manager = Arc::new(AlertManager::new(AlertConfig::default(), store.clone(), Arc::new(sink)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.process("acme", &event("PROBLEM")).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = store.instances("acme", None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(store.events("acme", all[0].id).await.unwrap().len(), 1);
    }
}
