use anyhow::{Context, Result};
use geotrack::api::{create_router, AppState};
use geotrack::broadcast::BroadcastHub;
use geotrack::config::{load_config, ConfigError, GeoTrackConfig};
use geotrack::presence::PresenceIndex;
use geotrack::store::{run_expiry_sweeper, GeoBackend, GeoStore, MemoryBackend};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geotrack=info,tower_http=info".into()),
        )
        .init();

    info!("Geotrack starting...");

    let config_path =
        std::env::var("GEOTRACK_CONFIG").unwrap_or_else(|_| "geotrack.toml".to_string());

    let mut config = match load_config(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %config_path, "Config file not found, using defaults");
            GeoTrackConfig::default()
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    let bind_addr = config.bind_addr()?;

    info!(
        bind_addr = %bind_addr,
        live_ttl_seconds = config.store.live_ttl_seconds,
        history_limit = config.store.history_limit,
        "Configuration loaded"
    );

    // In-memory key-value backend plus its expiry sweeper
    let memory = Arc::new(MemoryBackend::new());
    let backend: Arc<dyn GeoBackend> = memory.clone();
    tokio::spawn(run_expiry_sweeper(memory, config.store.sweep_interval()));

    let store = Arc::new(GeoStore::new(Arc::clone(&backend), config.store.store_config()));
    let presence = Arc::new(PresenceIndex::new(backend));

    let (hub, dispatcher) = BroadcastHub::new(config.broadcast.hub_config());
    tokio::spawn(dispatcher.run());

    let registry = config.auth.build_registry();
    if registry.count() == 0 {
        warn!("No auth tokens configured, every API request will be rejected");
    } else {
        info!(tokens = registry.count(), "Auth tokens loaded");
    }

    let state = AppState {
        store,
        presence,
        hub,
        authenticator: Arc::new(registry),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .context("Failed to bind HTTP listener")?;
    info!(addr = %bind_addr, "HTTP API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Geotrack stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
