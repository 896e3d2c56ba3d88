// End-to-end tests for the observer stream over a real socket
//
// The router is served on an ephemeral port and a tokio-tungstenite client
// connects through the full upgrade. Samples are ingested through the same
// router via oneshot, so both sides share one hub and one store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use futures::{SinkExt, StreamExt};
use geotrack::api::{create_router, AppState};
use geotrack::auth::{Role, TokenRegistry};
use geotrack::broadcast::{BroadcastHub, HubConfig};
use geotrack::presence::PresenceIndex;
use geotrack::store::{GeoBackend, GeoStore, MemoryBackend, StoreConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

struct TestServer {
    addr: SocketAddr,
    router: Router,
    hub: BroadcastHub,
    token: String,
}

async fn start_server() -> TestServer {
    let backend: Arc<dyn GeoBackend> = Arc::new(MemoryBackend::new());
    let (hub, dispatcher) = BroadcastHub::new(HubConfig::default());
    tokio::spawn(dispatcher.run());

    let registry = TokenRegistry::new();
    let token = registry.register("a1", Role::User);

    let router = create_router(AppState {
        store: Arc::new(GeoStore::new(Arc::clone(&backend), StoreConfig::default())),
        presence: Arc::new(PresenceIndex::new(backend)),
        hub: hub.clone(),
        authenticator: Arc::new(registry),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = router.clone();
    tokio::spawn(async move {
        axum::serve(listener, served).await.unwrap();
    });

    TestServer {
        addr,
        router,
        hub,
        token,
    }
}

async fn wait_for_connections(hub: &BroadcastHub, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {} connections, have {}",
            expected,
            hub.connection_count()
        )
    });
}

async fn request(server: &TestServer, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("authorization", format!("Bearer {}", server.token))
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_observer_receives_ingested_sample() {
    let server = start_server().await;

    let url = format!("ws://{}/api/ws?token={}", server.addr, server.token);
    let (mut socket, _) = connect_async(url).await.unwrap();
    wait_for_connections(&server.hub, 1).await;

    let (status, _) = request(
        &server,
        "POST",
        "/api/location",
        Body::from(json!({"lat": 52.52, "lon": 13.405}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .unwrap();
    let text = match frame {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {:?}", other),
    };
    let pushed: Value = serde_json::from_str(&text).unwrap();

    // The pushed payload is the stored sample, not the live entry wrapper
    let (_, history) = request(&server, "GET", "/api/history/a1", Body::empty()).await;
    assert_eq!(pushed, history[0]);
    assert_eq!(pushed["agent_id"], "a1");
    assert!(pushed.get("expires_at").is_none());

    socket.close(None).await.unwrap();
    wait_for_connections(&server.hub, 0).await;
}

#[tokio::test]
async fn test_client_disconnect_removes_observer() {
    let server = start_server().await;

    let url = format!("ws://{}/ws?token={}", server.addr, server.token);
    let (socket, _) = connect_async(url).await.unwrap();
    wait_for_connections(&server.hub, 1).await;

    // Dropping the client without a close frame ends the read side
    drop(socket);
    wait_for_connections(&server.hub, 0).await;

    // Publishing afterwards reaches nobody and does not fail
    let (status, _) = request(
        &server,
        "POST",
        "/api/location",
        Body::from(json!({"lat": 1.0, "lon": 2.0}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_every_observer_receives_each_sample() {
    let server = start_server().await;

    let url = format!("ws://{}/api/ws?token={}", server.addr, server.token);
    let (mut first, _) = connect_async(url.clone()).await.unwrap();
    let (mut second, _) = connect_async(url).await.unwrap();
    wait_for_connections(&server.hub, 2).await;

    request(
        &server,
        "POST",
        "/api/location",
        Body::from(json!({"lat": 10.0, "lon": 20.0}).to_string()),
    )
    .await;

    for socket in [&mut first, &mut second] {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        let pushed: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(pushed["lat"], 10.0);
        assert_eq!(pushed["lon"], 20.0);
    }
}
