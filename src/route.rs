//! # Route Planner
//!
//! Maintains an ordered list of waypoints (plaques) and derives a walkable
//! path with distance and time estimates.
//!
//! ## State
//!
//! - **Empty**: no waypoints
//! - **Building**: at least one waypoint, nothing in flight
//! - **Drawing**: a draw for the current waypoint list has been issued and
//!   not yet applied
//!
//! ## Drawing
//!
//! Each consecutive pair of waypoints becomes one segment. The directions
//! service is asked for a walking path; if that fails for any reason the
//! segment falls back to a straight line with Haversine distance and a
//! distinct style. Failures never abort the draw.
//!
//! Draws are split into [`RoutePlanner::prepare_draw`], [`DrawRequest::resolve`]
//! and [`RoutePlanner::apply_draw`]. Every change to the waypoint list bumps a
//! generation counter, and a resolved draw whose generation is no longer
//! current is discarded, so a slow draw can never overwrite a newer one.

use futures::stream::{self, StreamExt};
use geo::{algorithm::simplify::Simplify, Coord, LineString};
use log::{debug, info, warn};

use crate::config::RouteConfig;
use crate::directions::DirectionsClient;
use crate::error::{PlaquerError, Result};
use crate::geo_utils::{format_walking_time_at, point_distance_km, walking_minutes};
use crate::map_engine::{LayerId, LayerKind, MapEngine, PolylineSpec};
use crate::plaque::{PlaqueId, PlaqueRecord};
use crate::{Bounds, GpsPoint};

/// Minimum waypoints for `optimize_for_walking`.
pub const MIN_OPTIMIZE_WAYPOINTS: usize = 3;

/// Callback receiving the waypoint list after every change.
pub type RouteChangeCallback = Box<dyn FnMut(&[PlaqueRecord])>;

/// Lifecycle state of a route session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Empty,
    Building,
    Drawing,
}

/// How a segment's path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Path from the directions service
    Routed,
    /// Straight line used after a directions failure
    Fallback,
}

/// One leg between consecutive waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSegment {
    pub from_id: PlaqueId,
    pub to_id: PlaqueId,
    pub path: Vec<GpsPoint>,
    pub distance_km: f64,
    pub kind: SegmentKind,
}

/// Fully resolved route for one generation of the waypoint list.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    pub generation: u64,
    pub segments: Vec<RouteSegment>,
}

impl RouteGeometry {
    /// Sum of routed and fallback segment distances.
    pub fn total_distance_km(&self) -> f64 {
        self.segments.iter().map(|s| s.distance_km).sum()
    }

    pub fn fallback_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Fallback)
            .count()
    }

    /// Whether any segment is a straight-line estimate.
    pub fn is_approximate(&self) -> bool {
        self.fallback_count() > 0
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let points: Vec<GpsPoint> = self
            .segments
            .iter()
            .flat_map(|s| s.path.iter().copied())
            .collect();
        Bounds::from_points(&points)
    }
}

/// A draw of a specific waypoint list, independent of the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRequest {
    generation: u64,
    waypoints: Vec<(PlaqueId, GpsPoint)>,
    max_concurrent: usize,
    simplify_tolerance: Option<f64>,
}

impl DrawRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn waypoints(&self) -> &[(PlaqueId, GpsPoint)] {
        &self.waypoints
    }

    /// Resolve every segment, falling back to straight lines where the
    /// directions service fails. Segments keep waypoint order.
    pub async fn resolve<D: DirectionsClient + ?Sized>(&self, directions: &D) -> RouteGeometry {
        let pairs: Vec<((PlaqueId, GpsPoint), (PlaqueId, GpsPoint))> = self
            .waypoints
            .windows(2)
            .map(|w| (w[0], w[1]))
            .collect();

        let segments: Vec<RouteSegment> = stream::iter(pairs)
            .map(|(from, to)| self.resolve_segment(directions, from, to))
            .buffered(self.max_concurrent.max(1))
            .collect()
            .await;

        let geometry = RouteGeometry {
            generation: self.generation,
            segments,
        };
        info!(
            "[RoutePlanner] Resolved {} segments ({} fallback), {:.2} km",
            geometry.segments.len(),
            geometry.fallback_count(),
            geometry.total_distance_km()
        );
        geometry
    }

    async fn resolve_segment<D: DirectionsClient + ?Sized>(
        &self,
        directions: &D,
        (from_id, from): (PlaqueId, GpsPoint),
        (to_id, to): (PlaqueId, GpsPoint),
    ) -> RouteSegment {
        match directions.route_segment(from, to).await {
            Ok(routed) => RouteSegment {
                from_id,
                to_id,
                path: simplify_path(routed.path, self.simplify_tolerance),
                distance_km: routed.distance_km,
                kind: SegmentKind::Routed,
            },
            Err(e) => {
                warn!(
                    "[RoutePlanner] Directions failed for {} -> {}, using straight line: {}",
                    from_id, to_id, e
                );
                RouteSegment {
                    from_id,
                    to_id,
                    path: vec![from, to],
                    distance_km: point_distance_km(&from, &to),
                    kind: SegmentKind::Fallback,
                }
            }
        }
    }

    /// Blocking variant of [`DrawRequest::resolve`] for hosts without an
    /// async runtime.
    ///
    /// Fails with `Internal` when called from inside a tokio runtime; async
    /// callers should await [`DrawRequest::resolve`] instead.
    #[cfg(feature = "http")]
    pub fn resolve_blocking<D: DirectionsClient + ?Sized>(&self, directions: &D) -> Result<RouteGeometry> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(PlaquerError::Internal {
                message: "resolve_blocking called inside an async runtime".to_string(),
            });
        }
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PlaquerError::Internal {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;
        Ok(rt.block_on(self.resolve(directions)))
    }
}

fn simplify_path(path: Vec<GpsPoint>, tolerance: Option<f64>) -> Vec<GpsPoint> {
    let Some(tolerance) = tolerance.filter(|t| *t > 0.0) else {
        return path;
    };
    if path.len() <= 2 {
        return path;
    }

    let line: LineString<f64> = path
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();
    line.simplify(&tolerance)
        .0
        .iter()
        .map(|c| GpsPoint::new(c.y, c.x))
        .collect()
}

/// Reorder interior waypoints by nearest neighbour, keeping the first and
/// last waypoints in place.
///
/// Starting from the first waypoint, repeatedly appends the unplaced interior
/// waypoint closest to the current tail. Ties keep the original order.
/// Waypoints without usable coordinates are placed after all others.
/// Lists shorter than three are returned unchanged.
pub fn optimize_for_walking(waypoints: &[PlaqueRecord]) -> Vec<PlaqueRecord> {
    if waypoints.len() < MIN_OPTIMIZE_WAYPOINTS {
        return waypoints.to_vec();
    }

    let last = waypoints.len() - 1;
    let mut remaining: Vec<(&PlaqueRecord, Option<GpsPoint>)> = waypoints[1..last]
        .iter()
        .map(|p| (p, p.position().ok()))
        .collect();

    let mut ordered = Vec::with_capacity(waypoints.len());
    ordered.push(waypoints[0].clone());
    let mut tail = waypoints[0].position().ok();

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, (_, pos)) in remaining.iter().enumerate() {
            let d = match (tail, pos) {
                (Some(t), Some(p)) => point_distance_km(&t, p),
                _ => f64::INFINITY,
            };
            if d < best_distance {
                best = i;
                best_distance = d;
            }
        }

        let (plaque, pos) = remaining.remove(best);
        ordered.push(plaque.clone());
        if pos.is_some() {
            tail = pos;
        }
    }

    ordered.push(waypoints[last].clone());
    ordered
}

/// Owner of the waypoint list and the route layer.
pub struct RoutePlanner {
    layer: LayerId,
    waypoints: Vec<PlaqueRecord>,
    generation: u64,
    pending: Option<u64>,
    geometry: Option<RouteGeometry>,
    on_route_change: Option<RouteChangeCallback>,
    config: RouteConfig,
}

impl RoutePlanner {
    /// Wait for the engine and create the route layer.
    pub async fn attach<E: MapEngine>(engine: &mut E, config: RouteConfig) -> Result<Self> {
        engine.ready().await?;
        let layer = engine.create_layer(LayerKind::RouteGroup)?;
        debug!("[RoutePlanner] Attached to layer {:?}", layer);

        Ok(Self {
            layer,
            waypoints: Vec::new(),
            generation: 0,
            pending: None,
            geometry: None,
            on_route_change: None,
            config,
        })
    }

    /// Register the callback fired after every waypoint list change.
    pub fn on_route_change(&mut self, f: impl FnMut(&[PlaqueRecord]) + 'static) {
        self.on_route_change = Some(Box::new(f));
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn waypoints(&self) -> &[PlaqueRecord] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn contains(&self, id: PlaqueId) -> bool {
        self.waypoints.iter().any(|p| p.id == id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> RouteState {
        if self.waypoints.is_empty() {
            RouteState::Empty
        } else if self.pending == Some(self.generation) {
            RouteState::Drawing
        } else {
            RouteState::Building
        }
    }

    /// The currently drawn route, if any.
    pub fn geometry(&self) -> Option<&RouteGeometry> {
        self.geometry.as_ref()
    }

    pub fn total_distance_km(&self) -> Option<f64> {
        self.geometry.as_ref().map(|g| g.total_distance_km())
    }

    /// Walking time for the drawn route in whole minutes.
    pub fn walking_minutes(&self) -> Option<u32> {
        self.total_distance_km()
            .map(|km| walking_minutes(km, self.config.walking_speed_kmh))
    }

    /// Walking time for the drawn route, formatted.
    pub fn walking_time(&self) -> Option<String> {
        self.total_distance_km()
            .map(|km| format_walking_time_at(km, self.config.walking_speed_kmh))
    }

    /// Append a waypoint.
    ///
    /// Rejects plaques already in the route and plaques without usable
    /// coordinates, leaving the list untouched. Returns a draw request once
    /// the route has at least two waypoints.
    pub fn add_waypoint(&mut self, plaque: PlaqueRecord) -> Result<Option<DrawRequest>> {
        if self.contains(plaque.id) {
            debug!("[RoutePlanner] Plaque {} already in route", plaque.id);
            return Err(PlaquerError::DuplicateWaypoint {
                plaque_id: plaque.id,
                title: plaque.title,
            });
        }
        plaque.position()?;

        self.waypoints.push(plaque);
        self.changed();
        Ok(self.prepare_draw())
    }

    /// Remove a waypoint by plaque id. Unknown ids are a no-op.
    ///
    /// With fewer than two waypoints left, the drawn route is removed.
    pub fn remove_waypoint<E: MapEngine>(&mut self, engine: &mut E, id: PlaqueId) -> Option<DrawRequest> {
        let index = self.waypoints.iter().position(|p| p.id == id)?;
        self.waypoints.remove(index);
        self.changed();

        if self.waypoints.len() < 2 {
            self.clear_drawn(engine);
            return None;
        }
        self.prepare_draw()
    }

    /// Move the waypoint at `from` to position `to`.
    pub fn move_waypoint(&mut self, from: usize, to: usize) -> Result<Option<DrawRequest>> {
        let len = self.waypoints.len();
        for index in [from, to] {
            if index >= len {
                return Err(PlaquerError::InvalidIndex { index, len });
            }
        }
        if from == to {
            return Ok(None);
        }

        let plaque = self.waypoints.remove(from);
        self.waypoints.insert(to, plaque);
        self.changed();
        Ok(self.prepare_draw())
    }

    /// Remove every waypoint and the drawn route.
    pub fn clear<E: MapEngine>(&mut self, engine: &mut E) {
        let had_waypoints = !self.waypoints.is_empty();
        self.waypoints.clear();
        self.generation += 1;
        self.clear_drawn(engine);
        if had_waypoints {
            self.notify();
        }
        info!("[RoutePlanner] Route cleared");
    }

    /// Reorder interior waypoints by nearest neighbour (see
    /// [`optimize_for_walking`]). Needs at least three waypoints.
    pub fn optimize_for_walking(&mut self) -> Result<Option<DrawRequest>> {
        if self.waypoints.len() < MIN_OPTIMIZE_WAYPOINTS {
            return Err(PlaquerError::TooFewWaypoints {
                count: self.waypoints.len(),
                minimum: MIN_OPTIMIZE_WAYPOINTS,
            });
        }

        self.waypoints = optimize_for_walking(&self.waypoints);
        self.changed();
        info!(
            "[RoutePlanner] Optimized route of {} waypoints",
            self.waypoints.len()
        );
        Ok(self.prepare_draw())
    }

    /// Issue a draw for the current waypoint list, or `None` with fewer than
    /// two waypoints.
    pub fn prepare_draw(&mut self) -> Option<DrawRequest> {
        if self.waypoints.len() < 2 {
            return None;
        }

        let waypoints: Vec<(PlaqueId, GpsPoint)> = self
            .waypoints
            .iter()
            .filter_map(|p| p.position().ok().map(|pos| (p.id, pos)))
            .collect();

        self.pending = Some(self.generation);
        Some(DrawRequest {
            generation: self.generation,
            waypoints,
            max_concurrent: self.config.max_concurrent_segments,
            simplify_tolerance: self.config.simplify_tolerance,
        })
    }

    /// Draw a resolved route if it belongs to the current waypoint list.
    ///
    /// Returns `false` and leaves the map untouched for stale results.
    pub fn apply_draw<E: MapEngine>(&mut self, engine: &mut E, geometry: RouteGeometry) -> bool {
        if geometry.generation != self.generation || self.waypoints.len() < 2 {
            debug!(
                "[RoutePlanner] Discarding stale draw (generation {}, current {})",
                geometry.generation, self.generation
            );
            return false;
        }

        engine.clear_layer(self.layer);
        for segment in &geometry.segments {
            let style = match segment.kind {
                SegmentKind::Routed => self.config.routed_style.clone(),
                SegmentKind::Fallback => self.config.fallback_style.clone(),
            };
            let line = PolylineSpec {
                points: segment.path.clone(),
                style,
            };
            if let Err(e) = engine.add_polyline(self.layer, line) {
                warn!(
                    "[RoutePlanner] Failed to draw segment {} -> {}: {}",
                    segment.from_id, segment.to_id, e
                );
            }
        }
        if let Some(bounds) = geometry.bounds() {
            engine.fit_bounds(bounds, self.config.fit_padding);
        }

        self.pending = None;
        self.geometry = Some(geometry);
        true
    }

    /// Prepare, resolve and apply a draw of the current waypoints.
    ///
    /// Returns the drawn geometry, or `None` with fewer than two waypoints.
    pub async fn draw_route<E: MapEngine, D: DirectionsClient + ?Sized>(
        &mut self,
        engine: &mut E,
        directions: &D,
    ) -> Option<&RouteGeometry> {
        let request = self.prepare_draw()?;
        let geometry = request.resolve(directions).await;
        if self.apply_draw(engine, geometry) {
            self.geometry.as_ref()
        } else {
            None
        }
    }

    /// Remove the route layer from the map.
    pub fn dispose<E: MapEngine>(mut self, engine: &mut E) {
        self.waypoints.clear();
        self.geometry = None;
        engine.remove_layer(self.layer);
        debug!("[RoutePlanner] Disposed layer {:?}", self.layer);
    }

    fn changed(&mut self) {
        self.generation += 1;
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(cb) = self.on_route_change.as_mut() {
            cb(&self.waypoints);
        }
    }

    fn clear_drawn<E: MapEngine>(&mut self, engine: &mut E) {
        engine.clear_layer(self.layer);
        self.geometry = None;
        self.pending = None;
    }
}
