use crate::auth::{Identity, Role, TokenRegistry};
use crate::broadcast::HubConfig;
use crate::store::StoreConfig;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Complete geotrack configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoTrackConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub broadcast: BroadcastSettings,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Presence store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Lifetime of a live entry after each write
    #[serde(default = "default_live_ttl_seconds")]
    pub live_ttl_seconds: u64,
    /// Samples retained per agent
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// How often expired keys are purged from the in-memory backend
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_live_ttl_seconds() -> u64 {
    300
}

fn default_history_limit() -> usize {
    100
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            live_ttl_seconds: default_live_ttl_seconds(),
            history_limit: default_history_limit(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl StoreSettings {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            live_ttl: Duration::from_secs(self.live_ttl_seconds),
            history_limit: self.history_limit,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Broadcast hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSettings {
    /// Published events buffered ahead of the dispatcher; overflow is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Events buffered per observer before it is disconnected
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_outbox_capacity() -> usize {
    64
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl BroadcastSettings {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.queue_capacity,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

/// Statically provisioned credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub agent_id: String,
    #[serde(default)]
    pub role: Role,
}

impl AuthConfig {
    pub fn build_registry(&self) -> TokenRegistry {
        let registry = TokenRegistry::new();
        for entry in &self.tokens {
            registry.insert(
                entry.token.clone(),
                Identity::new(entry.agent_id.clone(), entry.role),
            );
        }
        registry
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl GeoTrackConfig {
    /// Apply `GEOTRACK_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GEOTRACK_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(n) = lookup("GEOTRACK_LIVE_TTL_SECONDS").and_then(|v| v.parse().ok()) {
            self.store.live_ttl_seconds = n;
        }
        if let Some(n) = lookup("GEOTRACK_HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            self.store.history_limit = n;
        }
        if let Some(token) = lookup("GEOTRACK_ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.tokens.push(TokenConfig {
                token,
                agent_id: "admin".to_string(),
                role: Role::Admin,
            });
        }
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.store.live_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "store.live_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.store.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "store.history_limit must be positive".to_string(),
            ));
        }
        if self.store.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "store.sweep_interval_seconds must be positive".to_string(),
            ));
        }
        if self.broadcast.queue_capacity == 0 || self.broadcast.outbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broadcast capacities must be positive".to_string(),
            ));
        }
        if let Some(entry) = self
            .auth
            .tokens
            .iter()
            .find(|t| t.token.is_empty() || t.agent_id.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "auth token for agent '{}' has an empty token or agent_id",
                entry.agent_id
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_addr.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "server.bind_addr '{}': {}",
                self.server.bind_addr, e
            ))
        })
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<GeoTrackConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&contents).map_err(ConfigError::Parse)
}
