//! Alert Routes

use alerting::{AlertEvent, AlertInstance, AlertRule, AlertStatus, NewRule};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by lifecycle state
    pub status: Option<AlertStatus>,
}

/// Response for the alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<AlertInstance>,
    pub count: usize,
}

/// List alerts, newest first
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertResponse>, ApiError> {
    state.ensure_tenant(&tenant)?;
    let data = state.alerts.store().instances(&tenant, params.status).await?;
    Ok(Json(AlertResponse {
        count: data.len(),
        data,
    }))
}

/// Audit trail of one alert, oldest first
pub async fn get_alert_events(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, i64)>,
) -> Result<Json<Vec<AlertEvent>>, ApiError> {
    state.ensure_tenant(&tenant)?;
    let store = state.alerts.store();
    if store.instance(&tenant, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Alert {id} not found")));
    }
    Ok(Json(store.events(&tenant, id).await?))
}

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, i64)>,
) -> Result<Json<AlertInstance>, ApiError> {
    state.ensure_tenant(&tenant)?;
    Ok(Json(state.alerts.acknowledge(&tenant, id).await?))
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path((tenant, id)): Path<(String, i64)>,
) -> Result<Json<AlertInstance>, ApiError> {
    state.ensure_tenant(&tenant)?;
    Ok(Json(state.alerts.resolve(&tenant, id).await?))
}

pub async fn get_rules(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<AlertRule>>, ApiError> {
    state.ensure_tenant(&tenant)?;
    Ok(Json(state.alerts.store().rules(&tenant, None).await?))
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(rule): Json<NewRule>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    state.ensure_tenant(&tenant)?;
    if rule.source.is_empty() {
        return Err(ApiError::BadRequest("rule source must not be empty".into()));
    }
    let rule = state.alerts.store().create_rule(&tenant, rule).await?;
    info!("Rule {} created for {} ({})", rule.id, tenant, rule.source);
    Ok((StatusCode::CREATED, Json(rule)))
}
