//! # Plaquer Core
//!
//! Map marker management and walking-route planning for London's
//! commemorative plaques.
//!
//! This library provides:
//! - A marker manager that keeps a map's marker/cluster layer in step with a
//!   filtered plaque list
//! - A cluster icon renderer (size tiers, labels, hover previews)
//! - A route planner with routed segments, straight-line fallback and
//!   nearest-neighbour re-ordering
//! - Haversine distance, coordinate parsing and distance/time formatting
//!
//! ## Features
//!
//! - **`http`** - OpenRouteService walking-directions client (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use plaquer_core::{GpsPoint, geo_utils::haversine_distance_km};
//!
//! let trafalgar = GpsPoint::new(51.5080, -0.1281);
//! let st_pauls = GpsPoint::new(51.5138, -0.0984);
//!
//! let km = haversine_distance_km(
//!     trafalgar.latitude,
//!     trafalgar.longitude,
//!     st_pauls.latitude,
//!     st_pauls.longitude,
//! );
//! assert!(km > 2.0 && km < 2.3);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PlaquerError, Result};

// Geographic utilities (distance, parsing, formatting, projection)
pub mod geo_utils;

// Plaque records and dataset loading
pub mod plaque;
pub use plaque::{
    load_plaques_from_path, load_plaques_from_str, CoordinateValue, PlaqueColor, PlaqueId,
    PlaqueRecord,
};

// Configuration
pub mod config;
pub use config::{DirectionsConfig, MarkerConfig, PlaquerConfig, RouteConfig};

// Map engine capability and the in-memory engine
pub mod map_engine;
pub use map_engine::{
    LayerId, LayerKind, LineStyle, MapEngine, MarkerEvent, MarkerIcon, MarkerPopup, MarkerSpec,
    PolylineSpec, PopupAction, RecordingMapEngine, ViewState,
};

// Cluster icon rendering and clustering
pub mod cluster;
pub use cluster::{
    cluster_markers, ClusterIcon, ClusterPreview, ClusterRenderer, ClusterTier, PointCluster,
};

// Marker manager
pub mod markers;
pub use markers::{
    ClusterView, MarkerCallbacks, MarkerEntry, MarkerInputs, MarkerManager, RebuildReport,
};

// Walking directions
pub mod directions;
#[cfg(feature = "http")]
pub use directions::OpenRouteServiceClient;
pub use directions::{DirectionsClient, RoutedSegment, StraightLineDirections};

// Route planner
pub mod route;
pub use route::{
    optimize_for_walking, DrawRequest, RouteGeometry, RoutePlanner, RouteSegment, RouteState,
    SegmentKind,
};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use plaquer_core::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has finite, in-range coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Great-circle distance to another point in kilometres.
    pub fn distance_km(&self, other: &GpsPoint) -> f64 {
        geo_utils::haversine_distance_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a point lies inside (or on the edge of) the bounds.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![
            GpsPoint::new(51.50, -0.13),
            GpsPoint::new(51.52, -0.09),
            GpsPoint::new(51.51, -0.11),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.52);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.09);
        assert!(bounds.contains(&bounds.center()));
        assert!(Bounds::from_points(&[]).is_none());
    }
}
