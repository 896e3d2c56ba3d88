use crate::api::auth_middleware::authenticate_headers;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::Identity;
use crate::broadcast::{BroadcastHub, Observer, PendingConnection};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameters for WebSocket upgrade
#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Auth middleware for the WebSocket route.
///
/// Browsers cannot set headers on an upgrade request, so `?token=` is accepted
/// alongside the Authorization header. Runs before upgrade extraction so 401
/// is returned without a valid upgrade request.
pub async fn ws_auth(
    State(state): State<Arc<AppState>>,
    params: Option<Query<WsQuery>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(Query(params)) = params else {
        return ApiError::InvalidInput("Invalid query string".to_string()).into_response();
    };

    let resolved = match params.token {
        Some(ref token) => state
            .authenticator
            .authenticate(token)
            .map_err(ApiError::from),
        None => authenticate_headers(req.headers(), state.authenticator.as_ref()),
    };

    match resolved {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// GET /api/ws - Live location stream (auth handled by ws_auth middleware)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let hub = state.hub.clone();
    let pending = hub.begin_connect();
    info!(
        connection_id = pending.id(),
        agent_id = %identity.agent_id,
        "WebSocket upgrade request received"
    );
    ws.on_upgrade(move |socket| handle_socket(socket, hub, pending, identity))
}

/// Serve one observer until either side goes away
async fn handle_socket(
    socket: WebSocket,
    hub: BroadcastHub,
    pending: PendingConnection,
    identity: Identity,
) {
    let observer = hub.open(pending);
    let id = observer.id;
    info!(connection_id = id, agent_id = %identity.agent_id, "Observer connected");

    forward_events(socket, observer).await;

    hub.leave(id);
    info!(connection_id = id, "Observer disconnected");
}

/// Relay hub events to the socket. Inbound payloads are ignored.
async fn forward_events(mut socket: WebSocket, mut observer: Observer) {
    loop {
        tokio::select! {
            event = observer.outbox.recv() => {
                match event {
                    Some(payload) => {
                        if let Err(e) = socket.send(Message::Text(payload.to_string())).await {
                            debug!(error = %e, "Failed to send event, closing");
                            break;
                        }
                    }
                    // Evicted by the dispatcher
                    None => {
                        warn!(connection_id = observer.id, "Observer evicted");
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }
}
