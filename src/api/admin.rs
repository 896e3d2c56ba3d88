use crate::api::error::ApiError;
use crate::api::location::StatusResponse;
use crate::api::AppState;
use crate::auth::Identity;
use crate::broadcast::HubStats;
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct TrackedAgentsResponse {
    pub agents: Vec<String>,
    pub count: usize,
}

/// GET /api/admin/agents - Every agent with retained history
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TrackedAgentsResponse>, ApiError> {
    let agents = state.store.list_tracked().await?;
    Ok(Json(TrackedAgentsResponse {
        count: agents.len(),
        agents,
    }))
}

/// DELETE /api/admin/agents/:agent_id - Drop live entry and history.
///
/// The geo index keeps the agent's last position.
pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(agent_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !state.store.delete_agent(&agent_id).await? {
        return Err(ApiError::NotFound("Agent not found".to_string()));
    }

    info!(agent_id = %agent_id, deleted_by = %identity.agent_id, "Agent deleted");
    Ok(Json(StatusResponse {
        status: "agent deleted",
    }))
}

/// GET /api/admin/stats - Broadcast hub counters
pub async fn hub_stats(State(state): State<Arc<AppState>>) -> Json<HubStats> {
    Json(state.hub.stats())
}
