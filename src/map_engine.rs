//! # Map Engine
//!
//! Capability interface over a concrete mapping library. The marker manager
//! and route planner only talk to a [`MapEngine`]; binding to a particular
//! renderer (Leaflet in the browser, a native widget, a test double) happens
//! behind it.
//!
//! Everything handed to the engine is declarative: markers carry an icon
//! description and a popup template, and user interaction comes back as
//! [`MarkerEvent`] values rather than callbacks wired into rendered markup.

use std::collections::HashMap;

use futures::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PlaquerError, Result};
use crate::plaque::{PlaqueColor, PlaqueId};
use crate::{Bounds, GpsPoint};

// ============================================================================
// Declarative map content
// ============================================================================

/// Handle to a layer created by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// What a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Markers that the engine may cluster
    MarkerCluster,
    /// Route polylines
    RouteGroup,
}

/// Stroke style for a polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    /// SVG dash pattern, `None` for a solid line
    pub dash_array: Option<String>,
}

/// Icon state for one plaque marker, fixed when the marker is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerIcon {
    pub color: PlaqueColor,
    pub visited: bool,
    pub favorite: bool,
    pub selected: bool,
    pub size_px: u32,
}

impl MarkerIcon {
    /// CSS-style class list describing the icon state.
    pub fn class_name(&self) -> String {
        let mut class = format!("plaque-marker plaque-marker--{}", self.color);
        if self.visited {
            class.push_str(" plaque-marker--visited");
        }
        if self.favorite {
            class.push_str(" plaque-marker--favorite");
        }
        if self.selected {
            class.push_str(" plaque-marker--selected");
        }
        class
    }
}

/// An action offered in a marker popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupAction {
    ViewDetails,
    AddToRoute,
}

impl PopupAction {
    pub fn label(&self) -> &'static str {
        match self {
            PopupAction::ViewDetails => "View Details",
            PopupAction::AddToRoute => "Add to Route",
        }
    }
}

/// Popup template for a marker. The engine renders it; text is never
/// interpolated into markup here.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPopup {
    pub title: String,
    pub location: Option<String>,
    pub profession: String,
    pub visited: bool,
    pub favorite: bool,
    /// Buttons in display order
    pub actions: Vec<PopupAction>,
}

/// Everything the engine needs to place one marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub plaque_id: PlaqueId,
    pub position: GpsPoint,
    pub icon: MarkerIcon,
    pub popup: MarkerPopup,
}

/// A polyline to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PolylineSpec {
    pub points: Vec<GpsPoint>,
    pub style: LineStyle,
}

/// User interaction reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerEvent {
    pub plaque_id: PlaqueId,
    pub action: PopupAction,
}

/// Current viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub center: GpsPoint,
    pub zoom: f64,
}

// ============================================================================
// Engine capability
// ============================================================================

/// Operations the map core needs from a mapping library.
///
/// `ready` must complete before any other call; it is where a browser binding
/// loads its scripts and stylesheets.
pub trait MapEngine {
    /// Resolve once the engine can render.
    fn ready(&mut self) -> BoxFuture<'_, Result<()>>;

    fn create_layer(&mut self, kind: LayerKind) -> Result<LayerId>;

    /// Remove all content from a layer, keeping the layer.
    fn clear_layer(&mut self, layer: LayerId);

    /// Remove a layer and its content from the map.
    fn remove_layer(&mut self, layer: LayerId);

    /// Add markers to a layer in one batch.
    fn add_markers(&mut self, layer: LayerId, markers: Vec<MarkerSpec>) -> Result<()>;

    fn add_polyline(&mut self, layer: LayerId, line: PolylineSpec) -> Result<()>;

    /// Fit the viewport to the bounds with padding in pixels.
    fn fit_bounds(&mut self, bounds: Bounds, padding: (u32, u32));

    fn view_state(&self) -> Option<ViewState>;
}

// ============================================================================
// Recording engine
// ============================================================================

/// Content of one layer in a [`RecordingMapEngine`].
#[derive(Debug, Clone)]
pub struct RecordedLayer {
    pub kind: LayerKind,
    pub markers: Vec<MarkerSpec>,
    pub polylines: Vec<PolylineSpec>,
}

/// In-memory engine that keeps everything it is asked to render.
///
/// Used for headless operation and tests.
#[derive(Debug, Default)]
pub struct RecordingMapEngine {
    ready: bool,
    fail_ready: Option<String>,
    next_layer: u64,
    layers: HashMap<LayerId, RecordedLayer>,
    fits: Vec<(Bounds, (u32, u32))>,
    marker_batches: usize,
    view: Option<ViewState>,
}

impl RecordingMapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose `ready` fails, as when the map library cannot load.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_ready: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn layer(&self, layer: LayerId) -> Option<&RecordedLayer> {
        self.layers.get(&layer)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn markers(&self, layer: LayerId) -> &[MarkerSpec] {
        self.layers
            .get(&layer)
            .map(|l| l.markers.as_slice())
            .unwrap_or_default()
    }

    pub fn polylines(&self, layer: LayerId) -> &[PolylineSpec] {
        self.layers
            .get(&layer)
            .map(|l| l.polylines.as_slice())
            .unwrap_or_default()
    }

    /// Every `fit_bounds` call so far.
    pub fn fits(&self) -> &[(Bounds, (u32, u32))] {
        &self.fits
    }

    /// Number of `add_markers` calls so far.
    pub fn marker_batches(&self) -> usize {
        self.marker_batches
    }

    /// Simulate the user panning or zooming.
    pub fn set_view(&mut self, view: ViewState) {
        self.view = Some(view);
    }

    fn layer_mut(&mut self, layer: LayerId) -> Result<&mut RecordedLayer> {
        self.layers.get_mut(&layer).ok_or_else(|| PlaquerError::MapEngine {
            message: format!("unknown layer {:?}", layer),
        })
    }
}

impl MapEngine for RecordingMapEngine {
    fn ready(&mut self) -> BoxFuture<'_, Result<()>> {
        let outcome = match &self.fail_ready {
            Some(message) => Err(PlaquerError::MapEngine {
                message: message.clone(),
            }),
            None => {
                self.ready = true;
                Ok(())
            }
        };
        Box::pin(async move { outcome })
    }

    fn create_layer(&mut self, kind: LayerKind) -> Result<LayerId> {
        if !self.ready {
            return Err(PlaquerError::MapEngine {
                message: "engine used before ready".to_string(),
            });
        }
        self.next_layer += 1;
        let id = LayerId(self.next_layer);
        self.layers.insert(
            id,
            RecordedLayer {
                kind,
                markers: Vec::new(),
                polylines: Vec::new(),
            },
        );
        debug!("[RecordingMapEngine] Created {:?} layer {:?}", kind, id);
        Ok(id)
    }

    fn clear_layer(&mut self, layer: LayerId) {
        if let Some(l) = self.layers.get_mut(&layer) {
            l.markers.clear();
            l.polylines.clear();
        }
    }

    fn remove_layer(&mut self, layer: LayerId) {
        self.layers.remove(&layer);
    }

    fn add_markers(&mut self, layer: LayerId, markers: Vec<MarkerSpec>) -> Result<()> {
        self.layer_mut(layer)?.markers.extend(markers);
        self.marker_batches += 1;
        Ok(())
    }

    fn add_polyline(&mut self, layer: LayerId, line: PolylineSpec) -> Result<()> {
        self.layer_mut(layer)?.polylines.push(line);
        Ok(())
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding: (u32, u32)) {
        let span = (bounds.max_lat - bounds.min_lat)
            .max(bounds.max_lng - bounds.min_lng)
            .max(1e-6);
        let zoom = (360.0 / span).log2().clamp(0.0, 18.0).floor();
        self.view = Some(ViewState {
            center: bounds.center(),
            zoom,
        });
        self.fits.push((bounds, padding));
    }

    fn view_state(&self) -> Option<ViewState> {
        self.view
    }
}
