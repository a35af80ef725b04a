//! Schema Bootstrap

/// Applied in order on start; every statement is idempotent
pub(crate) const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS hosts (
        id              INTEGER PRIMARY KEY,
        tenant_id       TEXT    NOT NULL,
        map_id          INTEGER NOT NULL,
        external_id     TEXT,
        name            TEXT    NOT NULL,
        host_group      TEXT,
        location        TEXT,
        is_critical     INTEGER NOT NULL DEFAULT 0,
        current_status  TEXT    NOT NULL DEFAULT 'UNKNOWN'
    )"#,
    "CREATE INDEX IF NOT EXISTS hosts_scope ON hosts (tenant_id, map_id)",
    r#"CREATE TABLE IF NOT EXISTS links (
        id              INTEGER PRIMARY KEY,
        tenant_id       TEXT    NOT NULL,
        map_id          INTEGER NOT NULL,
        origin_host_id  INTEGER NOT NULL REFERENCES hosts (id),
        dest_host_id    INTEGER NOT NULL REFERENCES hosts (id),
        is_ring         INTEGER NOT NULL DEFAULT 0,
        priority        INTEGER NOT NULL DEFAULT 0,
        origin_role     TEXT,
        dest_role       TEXT,
        CHECK (origin_host_id <> dest_host_id)
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS links_host_pair ON links (
        tenant_id, map_id,
        MIN(origin_host_id, dest_host_id),
        MAX(origin_host_id, dest_host_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS alert_rules (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id            TEXT    NOT NULL,
        source               TEXT    NOT NULL,
        is_enabled           INTEGER NOT NULL DEFAULT 1,
        matchers             TEXT    NOT NULL DEFAULT '{}',
        dedupe_key_template  TEXT    NOT NULL,
        auto_resolve         INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS alert_rules_tenant_source ON alert_rules (tenant_id, source, id)",
    r#"CREATE TABLE IF NOT EXISTS alert_instances (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id     TEXT    NOT NULL,
        dedupe_key    TEXT    NOT NULL,
        status        TEXT    NOT NULL CHECK (status IN ('open', 'ack', 'resolved')),
        severity      TEXT    NOT NULL,
        rule_id       INTEGER NOT NULL REFERENCES alert_rules (id),
        payload       TEXT    NOT NULL,
        opened_at     INTEGER NOT NULL,
        last_seen_at  INTEGER NOT NULL,
        resolved_at   INTEGER
    )"#,
    // at most one active instance per key; resolved rows are unconstrained
    r#"CREATE UNIQUE INDEX IF NOT EXISTS alert_instances_active_key
        ON alert_instances (tenant_id, dedupe_key)
        WHERE status IN ('open', 'ack')"#,
    r#"CREATE TABLE IF NOT EXISTS alert_events (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        instance_id  INTEGER NOT NULL REFERENCES alert_instances (id),
        tenant_id    TEXT    NOT NULL,
        kind         TEXT    NOT NULL,
        from_status  TEXT,
        to_status    TEXT    NOT NULL,
        payload      TEXT    NOT NULL,
        created_at   INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS alert_events_instance ON alert_events (instance_id, id)",
];
