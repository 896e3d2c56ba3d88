use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Geospatial key-value capability consumed by the GeoStore.
///
/// Every method is one atomic call against the backend. No transaction spans
/// several calls. List indices are inclusive and may be negative (`-1` is the
/// last element), matching Redis `LRANGE`/`LTRIM` semantics.
#[async_trait]
pub trait GeoBackend: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), BackendError>;

    /// Read a string value. Expired or missing keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<usize, BackendError>;

    /// Append to the tail of a list, returning the new length
    async fn rpush(&self, key: &str, value: String) -> Result<usize, BackendError>;

    /// Read the inclusive range `start..=stop` of a list
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, BackendError>;

    /// Keep only the inclusive range `start..=stop` of a list
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), BackendError>;

    /// Add or move `member` in the geospatial index `key`
    async fn geo_add(&self, key: &str, member: &str, lat: f64, lon: f64) -> Result<(), BackendError>;

    /// Members of `key` within `radius_km` of the center (inclusive)
    async fn geo_search(
        &self,
        key: &str,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<GeoHit>, BackendError>;

    /// All live keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Remaining time-to-live of `key`
    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError>;
}

/// One radius search match
#[derive(Clone, Debug, PartialEq)]
pub struct GeoHit {
    pub member: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Result of a TTL inspection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (or already expired)
    Missing,
    /// Key exists without an expiry
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

/// Backend communication errors
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend could not be reached or the call timed out
    Unavailable(String),
    /// Operation does not apply to the value held at the key
    WrongType(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable(msg) => write!(f, "backend unavailable: {}", msg),
            BackendError::WrongType(key) => {
                write!(f, "operation against key '{}' holding the wrong kind of value", key)
            }
        }
    }
}

impl std::error::Error for BackendError {}
