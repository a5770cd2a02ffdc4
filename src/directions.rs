//! Walking directions between two points.
//!
//! The route planner asks a [`DirectionsClient`] for one leg at a time. Any
//! error from the client makes the planner fall back to a straight line for
//! that leg, so implementations should fail fast rather than retry.
//!
//! The OpenRouteService client posts `{"coordinates": [[lng, lat], [lng, lat]]}`
//! and reads a GeoJSON feature collection back. GeoJSON coordinates are
//! `[lng, lat]` and are swapped here; `properties.summary.distance` is metres.

use futures::future::BoxFuture;
use log::debug;
use serde::Deserialize;

use crate::error::{PlaquerError, Result};
use crate::geo_utils::polyline_length_km;
use crate::GpsPoint;

/// A leg returned by a directions service.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedSegment {
    /// Path in display order (lat/lng)
    pub path: Vec<GpsPoint>,
    pub distance_km: f64,
}

/// Source of walking paths between two points.
pub trait DirectionsClient: Send + Sync {
    fn route_segment(&self, from: GpsPoint, to: GpsPoint) -> BoxFuture<'_, Result<RoutedSegment>>;
}

/// Client used when no directions service is configured; every leg falls
/// back to a straight line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineDirections;

impl DirectionsClient for StraightLineDirections {
    fn route_segment(&self, _from: GpsPoint, _to: GpsPoint) -> BoxFuture<'_, Result<RoutedSegment>> {
        Box::pin(async {
            Err(PlaquerError::Config {
                message: "no directions service configured".to_string(),
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    // [lng, lat] or [lng, lat, elevation]
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    summary: Option<Summary>,
}

#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    distance: Option<f64>,
}

/// Parse a GeoJSON directions response into a segment.
///
/// Fails if there is no feature, fewer than two usable coordinates, or a
/// negative or non-finite distance. A missing distance is measured from the
/// geometry.
pub fn parse_directions_response(body: &str) -> Result<RoutedSegment> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| PlaquerError::Directions {
            message: format!("Parse error: {}", e),
        })?;

    let feature = collection
        .features
        .into_iter()
        .next()
        .ok_or_else(|| PlaquerError::Directions {
            message: "response contained no route".to_string(),
        })?;

    let path: Vec<GpsPoint> = feature
        .geometry
        .coordinates
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| GpsPoint::new(c[1], c[0]))
        .filter(|p| p.is_valid())
        .collect();

    if path.len() < 2 {
        return Err(PlaquerError::Directions {
            message: format!("route geometry has {} usable points", path.len()),
        });
    }

    let distance_m = feature
        .properties
        .and_then(|p| p.summary)
        .and_then(|s| s.distance);

    let distance_km = match distance_m {
        Some(m) if m.is_finite() && m >= 0.0 => m / 1000.0,
        Some(m) => {
            return Err(PlaquerError::Directions {
                message: format!("invalid route distance {}", m),
            })
        }
        None => {
            debug!("[Directions] Response has no distance, measuring geometry");
            polyline_length_km(&path)
        }
    };

    Ok(RoutedSegment { path, distance_km })
}

#[cfg(feature = "http")]
mod ors {
    use std::time::Duration;

    use futures::future::BoxFuture;
    use log::debug;
    use reqwest::Client;

    use super::{parse_directions_response, DirectionsClient, RoutedSegment};
    use crate::config::DirectionsConfig;
    use crate::error::{PlaquerError, Result};
    use crate::GpsPoint;

    /// OpenRouteService foot-walking client.
    pub struct OpenRouteServiceClient {
        client: Client,
        endpoint: String,
        api_key: Option<String>,
    }

    impl OpenRouteServiceClient {
        pub fn new(config: &DirectionsConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| PlaquerError::Config {
                    message: format!("Failed to create HTTP client: {}", e),
                })?;

            Ok(Self {
                client,
                endpoint: config.endpoint.clone(),
                api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            })
        }

        async fn fetch(&self, from: GpsPoint, to: GpsPoint) -> Result<RoutedSegment> {
            let api_key = self.api_key.as_deref().ok_or_else(|| PlaquerError::Config {
                message: "missing directions API key".to_string(),
            })?;

            let body = serde_json::json!({
                "coordinates": [
                    [from.longitude, from.latitude],
                    [to.longitude, to.latitude],
                ]
            });

            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", api_key)
                .header("Accept", "application/json, application/geo+json")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(PlaquerError::Http {
                    message: format!("HTTP {}", status),
                    status_code: Some(status.as_u16()),
                });
            }

            let text = response.text().await?;
            let segment = parse_directions_response(&text)?;
            debug!(
                "[Directions] Routed {:.3} km with {} points",
                segment.distance_km,
                segment.path.len()
            );
            Ok(segment)
        }
    }

    impl DirectionsClient for OpenRouteServiceClient {
        fn route_segment(
            &self,
            from: GpsPoint,
            to: GpsPoint,
        ) -> BoxFuture<'_, Result<RoutedSegment>> {
            Box::pin(self.fetch(from, to))
        }
    }
}

#[cfg(feature = "http")]
pub use ors::OpenRouteServiceClient;

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"summary": {"distance": 2843.7, "duration": 2047.4}},
            "geometry": {
                "type": "LineString",
                "coordinates": [[-0.1278, 51.5074], [-0.1100, 51.5120, 12.0], [-0.0922, 51.5155]]
            }
        }]
    }"#;

    #[test]
    fn test_parse_swaps_coordinates() {
        let segment = parse_directions_response(ROUTE).unwrap();
        assert_eq!(segment.path.len(), 3);
        assert_eq!(segment.path[0], GpsPoint::new(51.5074, -0.1278));
        assert_eq!(segment.path[2], GpsPoint::new(51.5155, -0.0922));
        assert!((segment.distance_km - 2.8437).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_empty_routes() {
        let err = parse_directions_response(r#"{"features": []}"#).unwrap_err();
        assert!(matches!(err, PlaquerError::Directions { .. }));

        let single = r#"{"features": [{"geometry": {"coordinates": [[-0.1, 51.5]]}}]}"#;
        assert!(parse_directions_response(single).is_err());

        assert!(parse_directions_response(r#"{"error": "quota"}"#).is_err());
        assert!(parse_directions_response("<html>").is_err());
    }

    #[test]
    fn test_parse_measures_missing_distance() {
        let body = r#"{"features": [{"geometry": {"coordinates": [[-0.1278, 51.5074], [-0.0922, 51.5155]]}}]}"#;
        let segment = parse_directions_response(body).unwrap();
        assert!((segment.distance_km - polyline_length_km(&segment.path)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_straight_line_client_always_fails() {
        let client = StraightLineDirections;
        let result = client
            .route_segment(GpsPoint::new(51.5, -0.1), GpsPoint::new(51.6, -0.1))
            .await;
        assert!(result.is_err());
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let client = OpenRouteServiceClient::new(&crate::DirectionsConfig::default()).unwrap();
        let err = client
            .route_segment(GpsPoint::new(51.5, -0.1), GpsPoint::new(51.6, -0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaquerError::Config { .. }));
    }

    #[cfg(feature = "http")]
    fn keyed_config(endpoint: String) -> crate::DirectionsConfig {
        crate::DirectionsConfig {
            endpoint,
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
        }
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = keyed_config(format!("http://127.0.0.1:{}/v2/directions", port));
        let client = OpenRouteServiceClient::new(&config).unwrap();

        let err = client
            .route_segment(GpsPoint::new(51.5, -0.1), GpsPoint::new(51.6, -0.1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaquerError::Http { status_code: None, .. }));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_error_status_is_http_error() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let body = r#"{"error": "quota exceeded"}"#;
            let response = format!(
                "HTTP/1.1 403 Forbidden\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });

        let config = keyed_config(format!("http://{}/v2/directions", addr));
        let client = OpenRouteServiceClient::new(&config).unwrap();
        let err = client
            .route_segment(GpsPoint::new(51.5, -0.1), GpsPoint::new(51.6, -0.1))
            .await
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(
            err,
            PlaquerError::Http {
                status_code: Some(403),
                ..
            }
        ));
    }
}
