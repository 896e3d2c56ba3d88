use crate::store::{GeoBackend, KeyTtl, StoreError, LIVE_PREFIX};
use std::sync::Arc;
use tracing::debug;

/// Enumerates currently-live agents by TTL inspection.
///
/// The result is a point-in-time snapshot: an agent may expire between the
/// scan and the caller using it. Scan cost grows with the number of live
/// keys not yet collected by expiry, not with the number of active agents.
pub struct PresenceIndex {
    backend: Arc<dyn GeoBackend>,
}

impl PresenceIndex {
    pub fn new(backend: Arc<dyn GeoBackend>) -> Self {
        Self { backend }
    }

    /// Agent ids with a positive remaining TTL, sorted
    pub async fn list_active(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.backend.scan_prefix(LIVE_PREFIX).await?;

        let mut active = Vec::with_capacity(keys.len());
        for key in keys {
            match self.backend.ttl(&key).await {
                Ok(KeyTtl::Expires(remaining)) if !remaining.is_zero() => {}
                Ok(_) => continue,
                Err(e) => {
                    // Key may have vanished between scan and lookup
                    debug!(key = %key, error = %e, "Skipping key with unreadable TTL");
                    continue;
                }
            }

            if let Some(agent_id) = key.strip_prefix(LIVE_PREFIX) {
                if !agent_id.is_empty() {
                    active.push(agent_id.to_string());
                }
            }
        }

        active.sort();
        Ok(active)
    }
}
