//! Configuration for the marker manager, route planner and directions client.
//!
//! Every struct has a `Default` matching the values the web app ships with and
//! can be loaded from JSON. Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{PlaquerError, Result};
use crate::map_engine::LineStyle;

/// OpenRouteService foot-walking endpoint returning GeoJSON.
pub const DEFAULT_DIRECTIONS_ENDPOINT: &str =
    "https://api.openrouteservice.org/v2/directions/foot-walking/geojson";

/// Configuration for the marker manager and cluster renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Padding in pixels applied when fitting the viewport to all markers.
    /// Default: (50, 50)
    pub fit_padding: (u32, u32),

    /// Marker icon edge length in pixels. Default: 32
    pub marker_size: u32,

    /// Icon edge length for the selected plaque. Default: 40
    pub selected_marker_size: u32,

    /// Markers closer than this many pixels are clustered. Default: 80
    pub cluster_radius_px: f64,

    /// Zoom level at and above which clustering is disabled. Default: 18
    pub max_zoom: u8,

    /// Number of titles listed in a small cluster's preview. Default: 5
    pub preview_title_limit: usize,

    /// Clusters larger than this show a per-category summary instead of
    /// titles. Default: 50
    pub preview_category_threshold: usize,

    /// Categories listed in a large cluster's preview. Default: 4
    pub preview_top_categories: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            fit_padding: (50, 50),
            marker_size: 32,
            selected_marker_size: 40,
            cluster_radius_px: 80.0,
            max_zoom: 18,
            preview_title_limit: 5,
            preview_category_threshold: 50,
            preview_top_categories: 4,
        }
    }
}

/// Configuration for the route planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Constant walking speed used for time estimates. Default: 5.0 km/h
    pub walking_speed_kmh: f64,

    /// Padding in pixels applied when fitting the viewport to the route.
    pub fit_padding: (u32, u32),

    /// Style for segments that came back from the directions service.
    pub routed_style: LineStyle,

    /// Style for straight-line fallback segments.
    pub fallback_style: LineStyle,

    /// Segment requests in flight at once. Default: 4
    pub max_concurrent_segments: usize,

    /// Douglas-Peucker tolerance in degrees for routed geometry, `None`
    /// keeps every vertex. Default: 0.00001 (~1 m)
    pub simplify_tolerance: Option<f64>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            walking_speed_kmh: crate::geo_utils::DEFAULT_WALKING_SPEED_KMH,
            fit_padding: (50, 50),
            routed_style: LineStyle {
                color: "#10b981".to_string(),
                weight: 4.0,
                opacity: 0.8,
                dash_array: None,
            },
            fallback_style: LineStyle {
                color: "#f97316".to_string(),
                weight: 3.0,
                opacity: 0.6,
                dash_array: Some("8, 8".to_string()),
            },
            max_concurrent_segments: 4,
            simplify_tolerance: Some(0.00001),
        }
    }
}

/// Configuration for the walking-directions service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub endpoint: String,
    /// Without a key every segment falls back to a straight line.
    pub api_key: Option<String>,
    /// Per-request timeout. Default: 30 s
    pub timeout_secs: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_DIRECTIONS_ENDPOINT.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl DirectionsConfig {
    /// Build a config from `PLAQUER_ORS_API_KEY`, `PLAQUER_ORS_ENDPOINT` and
    /// `PLAQUER_ORS_TIMEOUT_SECS`, using defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_key = lookup("PLAQUER_ORS_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let endpoint = lookup("PLAQUER_ORS_ENDPOINT").unwrap_or(defaults.endpoint);
        let timeout_secs = lookup("PLAQUER_ORS_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            endpoint,
            api_key,
            timeout_secs,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Top-level configuration bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaquerConfig {
    pub markers: MarkerConfig,
    pub route: RouteConfig,
    pub directions: DirectionsConfig,
}

impl PlaquerConfig {
    /// Parse a JSON config document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| PlaquerError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.route.walking_speed_kmh.is_finite() && self.route.walking_speed_kmh > 0.0) {
            return Err(PlaquerError::Config {
                message: format!(
                    "walking_speed_kmh must be positive, got {}",
                    self.route.walking_speed_kmh
                ),
            });
        }
        if self.route.max_concurrent_segments == 0 {
            return Err(PlaquerError::Config {
                message: "max_concurrent_segments must be at least 1".to_string(),
            });
        }
        if self.markers.cluster_radius_px < 0.0 {
            return Err(PlaquerError::Config {
                message: "cluster_radius_px must not be negative".to_string(),
            });
        }
        Ok(())
    }
}
