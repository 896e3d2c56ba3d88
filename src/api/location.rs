use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::Identity;
use crate::movement::MovementResult;
use crate::sample::{validate_coordinates, LocationReport, Sample};
use crate::store::{LiveEntry, NearbyAgent};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Success response for location ingestion
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// GET /api/active response
#[derive(Serialize)]
pub struct ActiveResponse {
    pub agents: Vec<String>,
}

/// Query parameters for GET /api/nearby.
///
/// Kept as strings so parse failures produce the regular error body.
#[derive(Deserialize)]
pub struct NearbyParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius: Option<String>,
}

/// GET /api/movement response
#[derive(Serialize)]
pub struct MovementResponse {
    pub agent_id: String,
    pub from: Sample,
    pub to: Sample,
    pub distance_km: f64,
    /// Initial bearing in degrees
    pub direction: f64,
    pub speed_kph: f64,
}

#[derive(Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<Feature>,
}

#[derive(Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub properties: FeatureProperties,
    pub geometry: PointGeometry,
}

#[derive(Serialize)]
pub struct FeatureProperties {
    /// RFC3339
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// [lon, lat]
    pub coordinates: [f64; 2],
}

impl From<&Sample> for Feature {
    fn from(sample: &Sample) -> Self {
        Self {
            kind: "Feature",
            properties: FeatureProperties {
                timestamp: sample
                    .observed_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            geometry: PointGeometry {
                kind: "Point",
                coordinates: [sample.lon, sample.lat],
            },
        }
    }
}

/// POST /api/location - Store a position report and broadcast it
///
/// The broadcast only happens after the store accepted the write; observers
/// are served asynchronously from the response.
pub async fn post_location(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let report: LocationReport = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid JSON: {}", e)))?;

    let sample = report.into_sample(&identity, Utc::now())?;
    let payload = state.store.write(&sample).await?;

    if !state.hub.publish(payload) {
        debug!(agent_id = %sample.agent_id, "Sample stored but not broadcast");
    }

    info!(
        agent_id = %sample.agent_id,
        reported_by = %identity.agent_id,
        "Location stored"
    );

    Ok(Json(StatusResponse {
        status: "location stored",
    }))
}

/// GET /api/location/:agent_id - Current live entry
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<LiveEntry>, ApiError> {
    state
        .store
        .read_live(&agent_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Location not found".to_string()))
}

/// GET /api/history/:agent_id - Retained samples, oldest first
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    Ok(Json(state.store.read_full_history(&agent_id).await?))
}

/// GET /api/active - Agents whose live entry has not expired
pub async fn get_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveResponse>, ApiError> {
    let agents = state.presence.list_active().await?;
    Ok(Json(ActiveResponse { agents }))
}

/// GET /api/nearby?lat=&lon=&radius= - Radius search in kilometres
///
/// Results come from the geo index and may include agents whose live entry
/// already expired.
pub async fn get_nearby(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<NearbyAgent>>, ApiError> {
    let lat = parse_decimal("lat", params.lat.as_deref())?;
    let lon = parse_decimal("lon", params.lon.as_deref())?;
    let radius = parse_decimal("radius", params.radius.as_deref())?;

    validate_coordinates(lat, lon)?;
    if radius < 0.0 {
        return Err(ApiError::InvalidInput(
            "radius must not be negative".to_string(),
        ));
    }

    Ok(Json(state.store.radius_search(lat, lon, radius).await?))
}

/// GET /api/geojson/:agent_id - History as a GeoJSON FeatureCollection
pub async fn get_geojson(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<FeatureCollection>, ApiError> {
    let history = state.store.read_full_history(&agent_id).await?;

    Ok(Json(FeatureCollection {
        kind: "FeatureCollection",
        features: history.iter().map(Feature::from).collect(),
    }))
}

/// GET /api/movement/:agent_id - Kinematics between the last two samples
pub async fn get_movement(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<MovementResponse>, ApiError> {
    let mut last_two = state.store.read_history(&agent_id, -2, -1).await?;
    if last_two.len() < 2 {
        return Err(ApiError::InsufficientHistory);
    }

    let to = last_two.remove(1);
    let from = last_two.remove(0);
    let movement = MovementResult::between(&from, &to);

    Ok(Json(MovementResponse {
        agent_id,
        from,
        to,
        distance_km: movement.distance_km,
        direction: movement.bearing_deg,
        speed_kph: movement.speed_kph,
    }))
}

/// GET /api/me - Identity of the caller
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// Parse a required finite decimal query parameter
fn parse_decimal(name: &str, raw: Option<&str>) -> Result<f64, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::InvalidInput(format!("Missing query parameter '{}'", name)))?;

    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ApiError::InvalidInput(format!(
            "Invalid query parameter '{}': {}",
            name, raw
        ))),
    }
}
