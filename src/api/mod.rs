// HTTP and WebSocket APIs

mod admin;
pub mod auth_middleware;
mod error;
mod location;
pub mod websocket;

pub use error::ApiError;

use crate::auth::Authenticator;
use crate::broadcast::BroadcastHub;
use crate::presence::PresenceIndex;
use crate::store::GeoStore;
use auth_middleware::{require_admin, require_identity};
use axum::{
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<GeoStore>,
    pub presence: Arc<PresenceIndex>,
    pub hub: BroadcastHub,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Build the full HTTP router.
///
/// Everything under /api requires a bearer token; /api/admin additionally
/// requires the admin role. /health is open.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let admin = Router::new()
        .route("/api/admin/agents", get(admin::list_agents))
        .route("/api/admin/agents/:agent_id", delete(admin::delete_agent))
        .route("/api/admin/stats", get(admin::hub_stats))
        .route_layer(middleware::from_fn(require_admin));

    let api = Router::new()
        .route("/api/location", post(location::post_location))
        .route("/api/location/:agent_id", get(location::get_location))
        .route("/api/history/:agent_id", get(location::get_history))
        .route("/api/active", get(location::get_active))
        .route("/api/nearby", get(location::get_nearby))
        .route("/api/geojson/:agent_id", get(location::get_geojson))
        .route("/api/movement/:agent_id", get(location::get_movement))
        .route("/api/me", get(location::me))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let ws = Router::new()
        .route("/api/ws", get(websocket::ws_handler))
        // Unprefixed alias for existing observer clients
        .route("/ws", get(websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            websocket::ws_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(ws)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// GET /health - Liveness probe
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
