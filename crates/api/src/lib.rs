//! Ringwatch API Server
//!
//! REST surface over the status engine and the alert lifecycle.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod config;
mod error;
pub mod rate_limit;
mod routes;

pub use config::{LoggingConfig, Settings};
pub use error::ApiError;

use alerting::{AlertManager, ChannelSink, Notification};
use rate_limit::{create_governor_config, WebhookGovernorConfig};
use status_engine::StatusPoller;
use storage::SqliteStore;
use telemetry::{Connection, ZabbixClient};

/// Application state shared across handlers
pub struct AppState {
    pub poller: StatusPoller,
    pub alerts: AlertManager,
    /// Monitoring backend connection per known tenant
    pub tenants: HashMap<String, Connection>,
    /// Prometheus render handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(poller: StatusPoller, alerts: AlertManager, tenants: HashMap<String, Connection>) -> Self {
        Self {
            poller,
            alerts,
            tenants,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Connection descriptor for a tenant
    pub fn connection(&self, tenant: &str) -> Result<&Connection, ApiError> {
        self.tenants
            .get(tenant)
            .ok_or_else(|| ApiError::UnknownTenant(tenant.to_string()))
    }

    pub fn ensure_tenant(&self, tenant: &str) -> Result<(), ApiError> {
        self.connection(tenant).map(|_| ())
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cached_maps: usize,
    pub tenants: usize,
}

/// Create the application router; `webhook_limit` rate-limits the event webhook
pub fn create_router(state: Arc<AppState>, webhook_limit: Option<Arc<WebhookGovernorConfig>>) -> Router {
    let mut ingest = post(routes::events::post_event);
    if let Some(config) = webhook_limit {
        ingest = ingest.layer(GovernorLayer { config });
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/tenants/:tenant/maps/:map/status", get(routes::status::get_status))
        .route(
            "/api/v1/tenants/:tenant/maps/:map/reachability",
            get(routes::status::get_reachability),
        )
        .route("/api/v1/tenants/:tenant/events", ingest)
        .route("/api/v1/tenants/:tenant/alerts", get(routes::alerts::get_alerts))
        .route(
            "/api/v1/tenants/:tenant/alerts/:id/events",
            get(routes::alerts::get_alert_events),
        )
        .route("/api/v1/tenants/:tenant/alerts/:id/ack", post(routes::alerts::acknowledge))
        .route("/api/v1/tenants/:tenant/alerts/:id/resolve", post(routes::alerts::resolve))
        .route(
            "/api/v1/tenants/:tenant/rules",
            get(routes::alerts::get_rules).post(routes::alerts::create_rule),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cached_maps: state.poller.cached_entries(),
        tenants: state.tenants.len(),
    })
}

/// Prometheus exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Hand notifications to the outside world; delivery itself is external
fn spawn_notification_relay(mut rx: UnboundedReceiver<Notification>) {
    tokio::spawn(async move {
        while let Some(note) = rx.recv().await {
            info!(
                tenant = %note.tenant_id,
                alert = note.alert_id,
                severity = note.severity.as_str(),
                "Notification: {}",
                note.title
            );
        }
    });
}

/// Wire stores, telemetry client, poller and alert manager from settings
pub async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let store = Arc::new(SqliteStore::connect(&settings.database).await?);
    let client = Arc::new(ZabbixClient::new(settings.telemetry.clone())?);
    let poller = StatusPoller::new(
        store.clone(),
        client,
        &settings.cache,
        settings.telemetry.poll_deadline(),
    );

    let (sink, rx) = ChannelSink::new();
    spawn_notification_relay(rx);
    let alerts = AlertManager::new(settings.alerting.clone(), store, Arc::new(sink));

    Ok(AppState::new(poller, alerts, settings.tenants.clone()))
}

/// Run the server
pub async fn run_server(settings: Settings, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let mut state = build_state(&settings).await?;
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    let limit = create_governor_config(&settings.server.webhook_rate_limit);
    let app = create_router(Arc::new(state), limit);

    info!(
        "Starting API server on {} ({} tenants)",
        settings.server.bind,
        settings.tenants.len()
    );
    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
