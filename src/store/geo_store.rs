use crate::sample::Sample;
use crate::store::backend::GeoBackend;
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key prefix of live-position entries (`live:<agent_id>`)
pub const LIVE_PREFIX: &str = "live:";

/// Key prefix of bounded history lists (`history:<agent_id>`)
pub const HISTORY_PREFIX: &str = "history:";

/// Single geospatial index keyed by agent id
pub const GEO_INDEX_KEY: &str = "geoindex";

/// GeoStore tuning
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Lifetime of a live entry, reset on every write
    pub live_ttl: Duration,
    /// Most recent samples kept per agent
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            live_ttl: Duration::from_secs(300),
            history_limit: 100,
        }
    }
}

/// Current position of an agent while its TTL has not elapsed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LiveEntry {
    #[serde(flatten)]
    pub sample: Sample,
    /// Expiry horizon, as set by the write that produced this entry
    pub expires_at: DateTime<Utc>,
}

/// One radius search result
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearbyAgent {
    pub agent_id: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Semantic layer over a geospatial key-value backend.
///
/// Owns the lifecycle of live entries, the geo index and history lists.
/// Every operation is independent; there is no cross-call transaction.
pub struct GeoStore {
    backend: Arc<dyn GeoBackend>,
    config: StoreConfig,
}

impl GeoStore {
    pub fn new(backend: Arc<dyn GeoBackend>, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    /// Store an accepted sample.
    ///
    /// Upserts the live entry (TTL reset), moves the agent in the geo index,
    /// appends to history and trims it to `history_limit`. The first failing
    /// step aborts the rest. Returns the serialized sample for broadcasting.
    pub async fn write(&self, sample: &Sample) -> Result<String, StoreError> {
        let payload = serde_json::to_string(sample)?;
        let live_key = live_key(&sample.agent_id);
        let history_key = history_key(&sample.agent_id);

        self.backend
            .set_ex(&live_key, payload.clone(), self.config.live_ttl)
            .await?;

        self.backend
            .geo_add(GEO_INDEX_KEY, &sample.agent_id, sample.lat, sample.lon)
            .await?;

        let len = self.backend.rpush(&history_key, payload.clone()).await?;
        if len > self.config.history_limit {
            let keep = self.config.history_limit as i64;
            self.backend.ltrim(&history_key, -keep, -1).await?;
        }

        debug!(
            agent_id = %sample.agent_id,
            lat = sample.lat,
            lon = sample.lon,
            "Stored sample"
        );

        Ok(payload)
    }

    /// Current live entry, or `None` if the agent never reported or expired
    pub async fn read_live(&self, agent_id: &str) -> Result<Option<LiveEntry>, StoreError> {
        let Some(raw) = self.backend.get(&live_key(agent_id)).await? else {
            return Ok(None);
        };

        let sample: Sample = serde_json::from_str(&raw)?;
        let ttl = chrono::Duration::from_std(self.config.live_ttl)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        Ok(Some(LiveEntry {
            expires_at: sample.observed_at + ttl,
            sample,
        }))
    }

    /// History slice by list offsets (inclusive, negative counts from the end).
    ///
    /// An agent without history yields an empty vector. Rows that fail to
    /// decode are skipped.
    pub async fn read_history(
        &self,
        agent_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        let rows = self
            .backend
            .lrange(&history_key(agent_id), from, to)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| match serde_json::from_str::<Sample>(row) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Skipping undecodable history row");
                    None
                }
            })
            .collect())
    }

    /// Entire retained history, oldest first
    pub async fn read_full_history(&self, agent_id: &str) -> Result<Vec<Sample>, StoreError> {
        self.read_history(agent_id, 0, -1).await
    }

    /// Agents whose indexed coordinate lies within `radius_km` of the center.
    ///
    /// Not filtered by liveness: geo index entries outlive expired live entries.
    pub async fn radius_search(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyAgent>, StoreError> {
        let hits = self
            .backend
            .geo_search(GEO_INDEX_KEY, lat, lon, radius_km)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| NearbyAgent {
                agent_id: hit.member,
                lat: hit.lat,
                lon: hit.lon,
                distance_km: hit.distance_km,
            })
            .collect())
    }

    /// Drop the live entry and history of an agent.
    ///
    /// The geo index entry is left in place. Returns whether anything existed.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<bool, StoreError> {
        let removed = self
            .backend
            .del(&[live_key(agent_id), history_key(agent_id)])
            .await?;
        Ok(removed > 0)
    }

    /// Agents with retained history, sorted
    pub async fn list_tracked(&self) -> Result<Vec<String>, StoreError> {
        let mut agents: Vec<String> = self
            .backend
            .scan_prefix(HISTORY_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(HISTORY_PREFIX).map(str::to_string))
            .filter(|agent_id| !agent_id.is_empty())
            .collect();
        agents.sort();
        Ok(agents)
    }
}

pub(crate) fn live_key(agent_id: &str) -> String {
    format!("{}{}", LIVE_PREFIX, agent_id)
}

pub(crate) fn history_key(agent_id: &str) -> String {
    format!("{}{}", HISTORY_PREFIX, agent_id)
}
