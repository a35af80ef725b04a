//! Map Status Routes

use axum::{
    extract::{Path, State},
    Json,
};
use status_engine::{PollResult, ReachabilityRow};
use std::sync::Arc;
use topology::{MapId, Scope};

use crate::error::ApiError;
use crate::AppState;

/// Current host statuses and ring breaks for a map
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path((tenant, map_id)): Path<(String, MapId)>,
) -> Result<Json<PollResult>, ApiError> {
    let conn = state.connection(&tenant)?;
    let result = state.poller.poll(&Scope::new(tenant, map_id), conn).await?;
    Ok(Json(PollResult::clone(&result)))
}

/// Effective status of every host by reachability from the core
pub async fn get_reachability(
    State(state): State<Arc<AppState>>,
    Path((tenant, map_id)): Path<(String, MapId)>,
) -> Result<Json<Vec<ReachabilityRow>>, ApiError> {
    state.ensure_tenant(&tenant)?;
    let rows = state.poller.reachability(&Scope::new(tenant, map_id)).await?;
    Ok(Json(rows))
}
