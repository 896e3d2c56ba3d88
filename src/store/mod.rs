// Geospatial presence store: live entries with TTL, bounded history, radius search

mod backend;
mod geo_store;
mod memory;

pub use backend::{BackendError, GeoBackend, GeoHit, KeyTtl};
pub use geo_store::{
    GeoStore, LiveEntry, NearbyAgent, StoreConfig, GEO_INDEX_KEY, HISTORY_PREFIX, LIVE_PREFIX,
};
pub use memory::{run_expiry_sweeper, MemoryBackend};

use std::fmt;


/// GeoStore errors
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend call failed; no stale data is substituted
    Unavailable(String),
    /// Stored value could not be encoded or decoded
    Encoding(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Encoding(msg) => write!(f, "encoding error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}
