//! Event Webhook

use alerting::{AlertOutcome, InboundEvent};
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Receive one monitoring event and run it through the alert lifecycle
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Json(inbound): Json<InboundEvent>,
) -> Result<Json<AlertOutcome>, ApiError> {
    state.ensure_tenant(&tenant)?;
    let event = inbound.normalize(&state.alerts.config().default_source)?;
    let outcome = state.alerts.process(&tenant, &event).await?;
    debug!(
        "Event {} {} for {}: {}",
        event.trigger_id,
        event.status.as_str(),
        tenant,
        outcome.as_str()
    );
    Ok(Json(outcome))
}
