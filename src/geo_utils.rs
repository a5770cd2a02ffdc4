//! Geographic utilities: distance, coordinate parsing, formatting and
//! web-mercator projection.
//!
//! All functions are pure. Distances use a spherical Earth (radius 6371 km),
//! which is accurate enough at walking scale; callers must not assume
//! ellipsoidal precision.

use crate::plaque::CoordinateValue;
use crate::GpsPoint;

/// Mean Earth radius used by the Haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default walking speed for time estimates.
pub const DEFAULT_WALKING_SPEED_KMH: f64 = 5.0;

const KM_TO_MILES: f64 = 0.621371;
const FEET_PER_MILE: f64 = 5280.0;

/// Web-mercator tile size in pixels.
pub const TILE_SIZE_PX: f64 = 256.0;

// Web-mercator is undefined at the poles
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Great-circle distance between two coordinates in kilometres.
///
/// Symmetric in its arguments and exactly zero for identical points.
///
/// # Example
/// ```
/// use plaquer_core::geo_utils::haversine_distance_km;
/// let d = haversine_distance_km(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d - 343.5).abs() < 1.0); // London to Paris
/// ```
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    // abs() keeps the result bit-identical when the arguments are swapped
    let dphi = (lat2 - lat1).abs().to_radians();
    let dlambda = (lon2 - lon1).abs().to_radians();

    let sin_dphi = (dphi / 2.0).sin();
    let sin_dlambda = (dlambda / 2.0).sin();

    let a = sin_dphi * sin_dphi + phi1.cos() * phi2.cos() * sin_dlambda * sin_dlambda;
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Haversine distance between two points in kilometres.
pub fn point_distance_km(a: &GpsPoint, b: &GpsPoint) -> f64 {
    haversine_distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Total length of a path in kilometres.
pub fn polyline_length_km(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| point_distance_km(&w[0], &w[1]))
        .sum()
}

/// Parse a coordinate value into a finite number.
///
/// Returns `None` instead of NaN for anything that is not a finite number or a
/// string holding one.
pub fn parse_coordinate(value: &CoordinateValue) -> Option<f64> {
    match value {
        CoordinateValue::Number(n) if n.is_finite() => Some(*n),
        CoordinateValue::Number(_) => None,
        CoordinateValue::Text(s) => parse_coordinate_str(s),
        CoordinateValue::Invalid => None,
    }
}

/// Parse a textual coordinate such as `"51.5074"`.
pub fn parse_coordinate_str(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a distance for display.
///
/// Metric: whole metres below 1 km, otherwise kilometres with one decimal.
/// Imperial: whole feet below 0.1 mi, otherwise miles with one decimal.
pub fn format_distance(km: f64, use_imperial: bool) -> String {
    let km = if km.is_finite() { km.max(0.0) } else { 0.0 };

    if use_imperial {
        let miles = km * KM_TO_MILES;
        if miles < 0.1 {
            format!("{} ft", (miles * FEET_PER_MILE).round() as u64)
        } else {
            format!("{:.1} mi", miles)
        }
    } else if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as u64)
    } else {
        format!("{:.1} km", km)
    }
}

/// Estimated walking time in whole minutes at the given speed.
///
/// Any non-zero distance takes at least one minute.
pub fn walking_minutes(km: f64, speed_kmh: f64) -> u32 {
    if !km.is_finite() || km <= 0.0 || !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return 0;
    }
    let minutes = (km / speed_kmh * 60.0).round() as u32;
    minutes.max(1)
}

/// Format the walking time for a distance at [`DEFAULT_WALKING_SPEED_KMH`].
pub fn format_walking_time(km: f64) -> String {
    format_walking_time_at(km, DEFAULT_WALKING_SPEED_KMH)
}

/// Format the walking time for a distance at a custom speed.
pub fn format_walking_time_at(km: f64, speed_kmh: f64) -> String {
    let minutes = walking_minutes(km, speed_kmh);
    if minutes < 60 {
        return format!("{} min", minutes);
    }
    let hours = minutes / 60;
    let rest = minutes % 60;
    if rest == 0 {
        format!("{} hr", hours)
    } else {
        format!("{} hr {} min", hours, rest)
    }
}

/// Project a point to global web-mercator pixel coordinates at a zoom level.
///
/// Returns `[x, y]` with the origin at the north-west corner of the world.
pub fn project_to_pixels(point: &GpsPoint, zoom: u8) -> [f64; 2] {
    let scale = TILE_SIZE_PX * 2f64.powi(zoom as i32);
    let lat = point.latitude.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = (point.longitude + 180.0) / 360.0 * scale;
    let merc_y = (std::f64::consts::PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    let y = (1.0 - merc_y / std::f64::consts::PI) / 2.0 * scale;
    [x, y]
}
