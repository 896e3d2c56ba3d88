use crate::movement::distance_km;
use crate::store::backend::{BackendError, GeoBackend, GeoHit, KeyTtl};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Value held at a key
#[derive(Clone, Debug)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    /// member -> (lat, lon)
    Geo(HashMap<String, (f64, f64)>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn list() -> Self {
        Self {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        }
    }

    fn geo() -> Self {
        Self {
            value: Value::Geo(HashMap::new()),
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process geospatial key-value backend.
///
/// Keys with a deadline become invisible once it passes and are physically
/// removed on the next access or sweep. State lives in memory only.
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove every expired key, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of physically stored keys, including expired ones not yet purged
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    fn purge_if_expired(&self, key: &str, now: Instant) {
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an inclusive, possibly negative range against a list of `len` items
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl GeoBackend for MemoryBackend {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), BackendError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        self.purge_if_expired(key, now);

        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.is_expired(now) => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(BackendError::WrongType(key.to_string())),
            },
        }
    }

    async fn del(&self, keys: &[String]) -> Result<usize, BackendError> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn rpush(&self, key: &str, value: String) -> Result<usize, BackendError> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(Entry::list);
        if entry.is_expired(now) {
            *entry = Entry::list();
        }

        match &mut entry.value {
            Value::List(items) => {
                items.push_back(value);
                Ok(items.len())
            }
            _ => Err(BackendError::WrongType(key.to_string())),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, BackendError> {
        let now = Instant::now();
        self.purge_if_expired(key, now);

        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        let Value::List(items) = &entry.value else {
            return Err(BackendError::WrongType(key.to_string()));
        };

        Ok(match normalize_range(items.len(), start, stop) {
            Some((from, to)) => items.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), BackendError> {
        let mut now_empty = false;

        if let Some(mut entry) = self.entries.get_mut(key) {
            let Value::List(items) = &mut entry.value else {
                return Err(BackendError::WrongType(key.to_string()));
            };
            match normalize_range(items.len(), start, stop) {
                Some((from, to)) => {
                    items.truncate(to + 1);
                    items.drain(..from);
                }
                None => items.clear(),
            }
            now_empty = items.is_empty();
        }

        // Empty lists do not exist
        if now_empty {
            self.entries
                .remove_if(key, |_, entry| matches!(&entry.value, Value::List(items) if items.is_empty()));
        }
        Ok(())
    }

    async fn geo_add(&self, key: &str, member: &str, lat: f64, lon: f64) -> Result<(), BackendError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(Entry::geo);

        match &mut entry.value {
            Value::Geo(members) => {
                members.insert(member.to_string(), (lat, lon));
                Ok(())
            }
            _ => Err(BackendError::WrongType(key.to_string())),
        }
    }

    async fn geo_search(
        &self,
        key: &str,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<GeoHit>, BackendError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        let Value::Geo(members) = &entry.value else {
            return Err(BackendError::WrongType(key.to_string()));
        };

        let mut hits: Vec<GeoHit> = members
            .iter()
            .map(|(member, &(m_lat, m_lon))| GeoHit {
                member: member.clone(),
                lat: m_lat,
                lon: m_lon,
                distance_km: distance_km(lat, lon, m_lat, m_lon),
            })
            .filter(|hit| hit.distance_km <= radius_km)
            .collect();

        hits.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(hits)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, BackendError> {
        let now = Instant::now();
        Ok(match self.entries.get(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.expires_at {
                None => KeyTtl::Persistent,
                Some(deadline) if deadline <= now => KeyTtl::Missing,
                Some(deadline) => KeyTtl::Expires(deadline - now),
            },
        })
    }
}

/// Periodically purge expired keys from the in-memory backend.
///
/// Without this, keys of agents that never report again are only dropped
/// when something touches them.
pub async fn run_expiry_sweeper(backend: Arc<MemoryBackend>, every: Duration) {
    let mut ticker = interval(every);

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let purged = backend.purge_expired();
        if purged > 0 {
            debug!(purged = purged, remaining = backend.key_count(), "Purged expired keys");
        }
    }
}
