use crate::auth::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{validate_coordinates, validate_agent_id, ValidationError};

/// Sample is one reported position of an agent.
///
/// Samples are immutable once stored. The same JSON encoding is used for the
/// live entry, each history row and the payload pushed to observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Stable agent identity (user or device)
    pub agent_id: String,

    /// Latitude in degrees, [-90, 90]
    pub lat: f64,

    /// Longitude in degrees, [-180, 180]
    pub lon: f64,

    /// Server-assigned ingestion time
    pub observed_at: DateTime<Utc>,
}

/// Body of POST /api/location
#[derive(Clone, Debug, Deserialize)]
pub struct LocationReport {
    /// Defaults to the authenticated agent when omitted
    #[serde(default)]
    pub agent_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl LocationReport {
    /// Validates the report and stamps it with the ingestion time.
    ///
    /// Only admins may report on behalf of another agent.
    pub fn into_sample(
        self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Sample, ValidationError> {
        let agent_id = match self.agent_id {
            Some(id) if id != identity.agent_id => {
                if !identity.is_admin() {
                    return Err(ValidationError::ForeignAgent(id));
                }
                id
            }
            _ => identity.agent_id.clone(),
        };

        validate_agent_id(&agent_id)?;
        validate_coordinates(self.lat, self.lon)?;

        Ok(Sample {
            agent_id,
            lat: self.lat,
            lon: self.lon,
            observed_at: now,
        })
    }
}
