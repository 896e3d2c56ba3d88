use std::fmt;

/// Longest accepted agent id, in bytes
pub const MAX_AGENT_ID_LEN: usize = 128;

/// Validation errors for location reports
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingAgentId,
    AgentIdTooLong(usize),
    InvalidAgentId(String),
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    ForeignAgent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingAgentId => write!(f, "agent_id is required"),
            ValidationError::AgentIdTooLong(len) => write!(
                f,
                "agent_id is {} bytes, at most {} allowed",
                len, MAX_AGENT_ID_LEN
            ),
            ValidationError::InvalidAgentId(id) => {
                write!(f, "agent_id '{}' contains control characters", id.escape_debug())
            }
            ValidationError::LatitudeOutOfRange(lat) => {
                write!(f, "lat must be within [-90, 90], got {}", lat)
            }
            ValidationError::LongitudeOutOfRange(lon) => {
                write!(f, "lon must be within [-180, 180], got {}", lon)
            }
            ValidationError::ForeignAgent(id) => {
                write!(f, "not allowed to report location for agent '{}'", id)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates an agent id.
///
/// Agent ids are opaque: any non-empty string up to 128 bytes without
/// control characters is accepted.
pub fn validate_agent_id(agent_id: &str) -> Result<(), ValidationError> {
    if agent_id.is_empty() {
        return Err(ValidationError::MissingAgentId);
    }
    if agent_id.len() > MAX_AGENT_ID_LEN {
        return Err(ValidationError::AgentIdTooLong(agent_id.len()));
    }
    if agent_id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidAgentId(agent_id.to_string()));
    }
    Ok(())
}

/// Validates a WGS84 coordinate pair. NaN and infinities are rejected.
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::LatitudeOutOfRange(lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::LongitudeOutOfRange(lon));
    }
    Ok(())
}
