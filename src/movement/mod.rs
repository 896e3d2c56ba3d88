// Great-circle kinematics between two samples. Pure functions, no I/O.

use crate::sample::Sample;
use chrono::{DateTime, Utc};
use serde::Serialize;


/// Mean Earth radius used for every distance computation
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Kinematics derived from two chronologically ordered samples.
/// Computed on demand, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MovementResult {
    pub distance_km: f64,
    pub bearing_deg: f64,
    pub speed_kph: f64,
}

impl MovementResult {
    /// Derive movement from `from` to `to`
    pub fn between(from: &Sample, to: &Sample) -> Self {
        Self {
            distance_km: distance_km(from.lat, from.lon, to.lat, to.lon),
            bearing_deg: bearing_deg(from.lat, from.lon, to.lat, to.lon),
            speed_kph: speed_kph(
                (from.lat, from.lon),
                from.observed_at,
                (to.lat, to.lon),
                to.observed_at,
            ),
        }
    }
}

/// Haversine distance in kilometres
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing from point 1 to point 2 in degrees, within [0, 360).
///
/// Identical points give 0 (atan2(0, 0) = 0).
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let bearing = (y.atan2(x).to_degrees() + 360.0) % 360.0;
    // (-tiny + 360) % 360 rounds to exactly 360.0
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Average speed in km/h between two timestamped points.
///
/// Returns 0 when `t2 <= t1`; out-of-order samples are treated as no motion.
pub fn speed_kph(
    p1: (f64, f64),
    t1: DateTime<Utc>,
    p2: (f64, f64),
    t2: DateTime<Utc>,
) -> f64 {
    let seconds = elapsed_seconds(t2 - t1);
    if seconds <= 0.0 {
        return 0.0;
    }

    distance_km(p1.0, p1.1, p2.0, p2.1) / (seconds / SECONDS_PER_HOUR)
}

/// Fractional seconds at the finest precision that does not overflow
fn elapsed_seconds(elapsed: chrono::Duration) -> f64 {
    if let Some(nanos) = elapsed.num_nanoseconds() {
        nanos as f64 / 1e9
    } else if let Some(micros) = elapsed.num_microseconds() {
        micros as f64 / 1e6
    } else {
        elapsed.num_milliseconds() as f64 / 1e3
    }
}
