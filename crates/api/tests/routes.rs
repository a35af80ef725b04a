use alerting::{AlertConfig, AlertManager, ChannelSink, MemoryAlertStore};
use api::rate_limit::{create_governor_config, RateLimitConfig};
use api::{create_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use result_cache::CacheConfig;
use serde_json::{json, Value};
use status_engine::StatusPoller;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{
    Connection, HostRecord, InterfaceState, QueryFailure, SubQuery, TelemetryError, TelemetrySnapshot,
    TelemetrySource,
};
use topology::{Host, Link, MemoryTopology};
use tower::ServiceExt;

struct FixedSource(TelemetrySnapshot);

#[async_trait]
impl TelemetrySource for FixedSource {
    async fn fetch(
        &self,
        _conn: &Connection,
        _host_ids: &[String],
        _deadline: tokio::time::Instant,
    ) -> TelemetrySnapshot {
        self.0.clone()
    }
}

fn all_up() -> TelemetrySnapshot {
    let mut snapshot = TelemetrySnapshot::default();
    for ext in ["h1", "h2", "h3"] {
        snapshot.hosts.insert(
            ext.to_string(),
            HostRecord {
                external_id: ext.to_string(),
                name: ext.to_uppercase(),
                interfaces: vec![InterfaceState::Available],
            },
        );
    }
    snapshot
}

fn auth_blackout() -> TelemetrySnapshot {
    let mut snapshot = TelemetrySnapshot::default();
    for query in [SubQuery::Hosts, SubQuery::Latency, SubQuery::Problems] {
        snapshot.failures.push(QueryFailure {
            query,
            error: TelemetryError::Auth("Session terminated, re-login, please.".into()),
        });
    }
    snapshot
}

fn app_with(snapshot: TelemetrySnapshot, limit: Option<RateLimitConfig>) -> Router {
    let topology = MemoryTopology::new();
    for id in 1..=3 {
        topology
            .insert_host("acme", Host::new(id, 1, format!("H{id}")).with_external_id(format!("h{id}")))
            .unwrap();
    }
    topology.insert_link("acme", Link::ring(1, 1, 1, 2).unwrap()).unwrap();
    topology.insert_link("acme", Link::ring(2, 1, 2, 3).unwrap()).unwrap();
    topology.insert_link("acme", Link::ring(3, 1, 3, 1).unwrap()).unwrap();

    let poller = StatusPoller::new(
        Arc::new(topology),
        Arc::new(FixedSource(snapshot)),
        &CacheConfig::default(),
        Duration::from_secs(5),
    );
    let (sink, _rx) = ChannelSink::new();
    let alerts = AlertManager::new(
        AlertConfig::default(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(sink),
    );
    let tenants = HashMap::from([(
        "acme".to_string(),
        Connection {
            url: "http://zbx/api_jsonrpc.php".into(),
            username: "api".into(),
            password: "secret".into(),
        },
    )]);

    let state = Arc::new(AppState::new(poller, alerts, tenants));
    create_router(state, limit.as_ref().and_then(create_governor_config))
}

fn app() -> Router {
    app_with(all_up(), None)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn problem(status: &str) -> Value {
    json!({
        "triggerid": "42",
        "host": "ring-b",
        "severity": "High",
        "status": status,
        "title": "Unavailable by ICMP ping"
    })
}

#[tokio::test]
async fn test_map_status() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/v1/tenants/acme/maps/1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hosts"]["h2"]["status"], "UP");
    assert_eq!(body["impactedLinks"], json!([]));
    assert_eq!(body["isolatedNodes"], json!([]));
}

#[tokio::test]
async fn test_unknown_tenant_is_404() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/v1/tenants/globex/maps/1/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_rejected_upstream_session_is_retryable_503() {
    let app = app_with(auth_blackout(), None);
    let (status, body) = send(&app, "GET", "/api/v1/tenants/acme/maps/1/status", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_reachability_after_poll() {
    let app = app();
    send(&app, "GET", "/api/v1/tenants/acme/maps/1/status", None).await;
    let (status, body) = send(&app, "GET", "/api/v1/tenants/acme/maps/1/reachability", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["effectiveStatus"], "UP");
    assert_eq!(rows[0]["depth"], 0);
}

#[tokio::test]
async fn test_webhook_lifecycle() {
    let app = app();
    let (status, rule) = send(
        &app,
        "POST",
        "/api/v1/tenants/acme/rules",
        Some(json!({ "source": "zabbix", "dedupe_key_template": "{{source}}:{{triggerid}}" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["auto_resolve"], false);

    let (status, first) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("PROBLEM"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["outcome"], "opened");
    assert_eq!(first["alert"]["dedupe_key"], "zabbix:42");
    let id = first["alert"]["id"].as_i64().unwrap();

    let (_, second) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("PROBLEM"))).await;
    assert_eq!(second["outcome"], "refreshed");

    let (_, ok) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("OK"))).await;
    assert_eq!(ok["outcome"], "manual_resolution_required");

    let (_, open) = send(&app, "GET", "/api/v1/tenants/acme/alerts?status=open", None).await;
    assert_eq!(open["count"], 1);

    let ack_uri = format!("/api/v1/tenants/acme/alerts/{id}/ack");
    let (status, acked) = send(&app, "POST", &ack_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["status"], "ack");
    let (status, _) = send(&app, "POST", &ack_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, resolved) = send(&app, "POST", &format!("/api/v1/tenants/acme/alerts/{id}/resolve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["status"], "resolved");

    let (_, trail) = send(&app, "GET", &format!("/api/v1/tenants/acme/alerts/{id}/events"), None).await;
    let kinds: Vec<&str> = trail
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["OPEN", "ACK", "RESOLVE"]);
}

#[tokio::test]
async fn test_event_without_matching_rule() {
    let app = app();
    let (status, body) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("PROBLEM"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "no_matching_rule");
}

#[tokio::test]
async fn test_malformed_event_is_400() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/tenants/acme/events",
        Some(json!({ "host": "ring-b", "status": "PROBLEM" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("triggerid"));
}

#[tokio::test]
async fn test_unknown_alert_is_404() {
    let app = app();
    let (status, _) = send(&app, "POST", "/api/v1/tenants/acme/alerts/99/resolve", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/api/v1/tenants/acme/alerts/99/events", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_rate_limited_per_peer() {
    let limit = RateLimitConfig {
        enabled: true,
        per_second: 60,
        burst_size: 2,
    };
    let app = app_with(all_up(), Some(limit));
    for _ in 0..2 {
        let (status, _) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("PROBLEM"))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app, "POST", "/api/v1/tenants/acme/events", Some(problem("PROBLEM"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // other routes are not limited
    let (status, _) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_metrics_without_recorder() {
    let app = app();
    send(&app, "GET", "/api/v1/tenants/acme/maps/1/status", None).await;
    let (status, health) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["cached_maps"], 1);
    assert_eq!(health["tenants"], 1);

    let (status, _) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
