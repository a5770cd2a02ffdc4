//! # Marker Manager
//!
//! Keeps the map's marker/cluster layer consistent with a plaque list and the
//! per-plaque UI flags (visited, favourite, selected).
//!
//! Every rebuild is a full replacement: the cluster layer is cleared, each
//! plaque is validated and turned into a marker, and all markers go back to
//! the engine in a single batch. After a rebuild the registry holds exactly
//! one entry per distinct, plottable plaque id from the input.
//!
//! Plaques without usable coordinates are skipped and logged. A failure while
//! building one marker is logged and does not stop the batch.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use log::{debug, info, warn};

use crate::cluster::{cluster_markers, ClusterIcon, ClusterPreview, ClusterRenderer, PointCluster};
use crate::config::MarkerConfig;
use crate::error::{PlaquerError, Result};
use crate::map_engine::{
    LayerId, LayerKind, MapEngine, MarkerEvent, MarkerIcon, MarkerPopup, MarkerSpec, PopupAction,
    ViewState,
};
use crate::plaque::{PlaqueId, PlaqueRecord};
use crate::{Bounds, GpsPoint};

/// Callback receiving the plaque a user interacted with.
pub type PlaqueCallback = Box<dyn FnMut(&PlaqueRecord)>;

/// Host callbacks invoked from marker popups.
#[derive(Default)]
pub struct MarkerCallbacks {
    /// "View Details" pressed
    pub on_marker_click: Option<PlaqueCallback>,
    /// "Add to Route" pressed (only offered in routing mode)
    pub on_add_to_route: Option<PlaqueCallback>,
}

impl MarkerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_marker_click(mut self, f: impl FnMut(&PlaqueRecord) + 'static) -> Self {
        self.on_marker_click = Some(Box::new(f));
        self
    }

    pub fn on_add_to_route(mut self, f: impl FnMut(&PlaqueRecord) + 'static) -> Self {
        self.on_add_to_route = Some(Box::new(f));
        self
    }
}

/// Inputs for one rebuild.
#[derive(Debug, Clone, Copy)]
pub struct MarkerInputs<'a> {
    pub plaques: &'a [PlaqueRecord],
    pub favorites: &'a HashSet<PlaqueId>,
    pub selected_id: Option<PlaqueId>,
    pub routing_mode: bool,
}

impl<'a> MarkerInputs<'a> {
    fn is_favorite(&self, plaque: &PlaqueRecord) -> bool {
        plaque.is_favorite || self.favorites.contains(&plaque.id)
    }

    /// Hash of everything that affects the rendered markers.
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.routing_mode.hash(&mut hasher);
        self.selected_id.hash(&mut hasher);
        self.plaques.len().hash(&mut hasher);
        for plaque in self.plaques {
            plaque.id.hash(&mut hasher);
            plaque.title.hash(&mut hasher);
            plaque.location.hash(&mut hasher);
            plaque.profession.hash(&mut hasher);
            plaque.color.hash(&mut hasher);
            plaque.visited.hash(&mut hasher);
            self.is_favorite(plaque).hash(&mut hasher);
            plaque
                .position()
                .ok()
                .map(|p| (p.latitude.to_bits(), p.longitude.to_bits()))
                .hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// One rendered marker, keyed by plaque id.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEntry {
    pub plaque: PlaqueRecord,
    pub position: GpsPoint,
    /// Icon state baked in when the marker was built
    pub icon: MarkerIcon,
    pub in_cluster_layer: bool,
}

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    /// Markers now in the registry
    pub rendered: usize,
    /// Plaques skipped for missing or invalid coordinates
    pub skipped: Vec<PlaqueId>,
    /// Plaques whose marker could not be built
    pub failed: Vec<PlaqueId>,
    /// Repeated ids ignored after their first occurrence
    pub duplicates: usize,
    /// Whether the viewport was fitted to the markers
    pub fitted: bool,
}

/// A cluster ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterView {
    pub cluster: PointCluster,
    pub icon: ClusterIcon,
    pub preview: ClusterPreview,
}

/// Owner of the marker/cluster layer.
pub struct MarkerManager {
    layer: LayerId,
    entries: HashMap<PlaqueId, MarkerEntry>,
    routing_mode: bool,
    last_view_state: Option<ViewState>,
    fit_requested: bool,
    fingerprint: Option<u64>,
    callbacks: MarkerCallbacks,
    renderer: ClusterRenderer,
    config: MarkerConfig,
}

impl MarkerManager {
    /// Wait for the engine and create the cluster layer.
    pub async fn attach<E: MapEngine>(
        engine: &mut E,
        config: MarkerConfig,
        callbacks: MarkerCallbacks,
    ) -> Result<Self> {
        engine.ready().await?;
        let layer = engine.create_layer(LayerKind::MarkerCluster)?;
        debug!("[MarkerManager] Attached to layer {:?}", layer);

        Ok(Self {
            layer,
            entries: HashMap::new(),
            routing_mode: false,
            last_view_state: None,
            fit_requested: false,
            fingerprint: None,
            callbacks,
            renderer: ClusterRenderer::from_config(&config),
            config,
        })
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: PlaqueId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: PlaqueId) -> Option<&MarkerEntry> {
        self.entries.get(&id)
    }

    /// Ids of all registered markers, ascending.
    pub fn marker_ids(&self) -> Vec<PlaqueId> {
        let mut ids: Vec<PlaqueId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remember the user's viewport; later rebuilds will not refit over it.
    pub fn record_view_state(&mut self, view: ViewState) {
        self.last_view_state = Some(view);
    }

    pub fn last_view_state(&self) -> Option<ViewState> {
        self.last_view_state
    }

    /// Fit the viewport to all markers on the next rebuild.
    pub fn request_fit(&mut self) {
        self.fit_requested = true;
    }

    /// Rebuild only if the inputs differ from the last rebuild.
    pub fn sync<E: MapEngine>(
        &mut self,
        engine: &mut E,
        inputs: MarkerInputs<'_>,
    ) -> Option<RebuildReport> {
        let fingerprint = inputs.fingerprint();
        if self.fingerprint == Some(fingerprint) && !self.fit_requested {
            debug!("[MarkerManager] Inputs unchanged, skipping rebuild");
            return None;
        }
        Some(self.rebuild(engine, inputs))
    }

    /// Replace every marker with one built from the current inputs.
    pub fn rebuild<E: MapEngine>(&mut self, engine: &mut E, inputs: MarkerInputs<'_>) -> RebuildReport {
        engine.clear_layer(self.layer);
        self.entries.clear();
        self.routing_mode = inputs.routing_mode;

        let mut report = RebuildReport::default();
        let mut specs = Vec::with_capacity(inputs.plaques.len());
        let mut seen = HashSet::with_capacity(inputs.plaques.len());

        for plaque in inputs.plaques {
            if !seen.insert(plaque.id) {
                debug!("[MarkerManager] Duplicate plaque id {} ignored", plaque.id);
                report.duplicates += 1;
                continue;
            }

            let position = match plaque.position() {
                Ok(p) => p,
                Err(e) => {
                    warn!("[MarkerManager] Skipping plaque: {}", e);
                    report.skipped.push(plaque.id);
                    continue;
                }
            };

            match self.build_marker(plaque, position, &inputs) {
                Ok(spec) => {
                    self.entries.insert(
                        plaque.id,
                        MarkerEntry {
                            plaque: plaque.clone(),
                            position,
                            icon: spec.icon,
                            in_cluster_layer: false,
                        },
                    );
                    specs.push(spec);
                }
                Err(e) => {
                    warn!(
                        "[MarkerManager] Failed to build marker for plaque {}: {}",
                        plaque.id, e
                    );
                    report.failed.push(plaque.id);
                }
            }
        }

        if !specs.is_empty() {
            match engine.add_markers(self.layer, specs) {
                Ok(()) => {
                    for entry in self.entries.values_mut() {
                        entry.in_cluster_layer = true;
                    }
                }
                Err(e) => warn!("[MarkerManager] Failed to add marker batch: {}", e),
            }
        }

        report.rendered = self.entries.len();
        report.fitted = self.fit_if_needed(engine);
        self.fingerprint = Some(inputs.fingerprint());

        info!(
            "[MarkerManager] Rebuilt {} markers ({} skipped, {} failed, {} duplicates)",
            report.rendered,
            report.skipped.len(),
            report.failed.len(),
            report.duplicates
        );
        report
    }

    /// Build the marker for one plaque.
    fn build_marker(
        &self,
        plaque: &PlaqueRecord,
        position: GpsPoint,
        inputs: &MarkerInputs<'_>,
    ) -> Result<MarkerSpec> {
        let selected = inputs.selected_id == Some(plaque.id);
        let size_px = if selected {
            self.config.selected_marker_size
        } else {
            self.config.marker_size
        };
        if size_px == 0 {
            return Err(PlaquerError::Internal {
                message: "marker size must be positive".to_string(),
            });
        }

        let favorite = inputs.is_favorite(plaque);
        let icon = MarkerIcon {
            color: plaque.color,
            visited: plaque.visited,
            favorite,
            selected,
            size_px,
        };

        let mut actions = vec![PopupAction::ViewDetails];
        if inputs.routing_mode {
            actions.push(PopupAction::AddToRoute);
        }

        Ok(MarkerSpec {
            plaque_id: plaque.id,
            position,
            icon,
            popup: MarkerPopup {
                title: plaque.title.clone(),
                location: plaque.location.clone(),
                profession: plaque.profession.clone(),
                visited: plaque.visited,
                favorite,
                actions,
            },
        })
    }

    fn fit_if_needed<E: MapEngine>(&mut self, engine: &mut E) -> bool {
        let first_population = self.last_view_state.is_none();
        if self.entries.is_empty() || !(first_population || self.fit_requested) {
            return false;
        }

        let positions: Vec<GpsPoint> = self.entries.values().map(|e| e.position).collect();
        let Some(bounds) = Bounds::from_points(&positions) else {
            return false;
        };

        engine.fit_bounds(bounds, self.config.fit_padding);
        self.fit_requested = false;
        self.last_view_state = Some(engine.view_state().unwrap_or(ViewState {
            center: bounds.center(),
            zoom: 0.0,
        }));
        true
    }

    /// Route a popup action to the host callbacks.
    ///
    /// Returns `false` for unknown plaques, for "Add to Route" outside
    /// routing mode, and when no callback is registered.
    pub fn dispatch(&mut self, event: MarkerEvent) -> bool {
        let Some(entry) = self.entries.get(&event.plaque_id) else {
            debug!(
                "[MarkerManager] Ignoring {:?} for unknown plaque {}",
                event.action, event.plaque_id
            );
            return false;
        };

        let callback = match event.action {
            PopupAction::ViewDetails => self.callbacks.on_marker_click.as_mut(),
            PopupAction::AddToRoute if self.routing_mode => self.callbacks.on_add_to_route.as_mut(),
            PopupAction::AddToRoute => None,
        };

        match callback {
            Some(cb) => {
                cb(&entry.plaque);
                true
            }
            None => false,
        }
    }

    /// Clusters of the current markers at a zoom level, with icons and
    /// previews.
    pub fn clusters(&self, zoom: u8) -> Vec<ClusterView> {
        let points: Vec<(PlaqueId, GpsPoint)> = self
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.position))
            .collect();

        cluster_markers(
            &points,
            zoom,
            self.config.cluster_radius_px,
            self.config.max_zoom,
        )
        .into_iter()
        .map(|cluster| {
            let members: Vec<&PlaqueRecord> = cluster
                .members
                .iter()
                .filter_map(|id| self.entries.get(id).map(|e| &e.plaque))
                .collect();
            ClusterView {
                icon: self.renderer.icon_for(cluster.len()),
                preview: self.renderer.preview_for(&members),
                cluster,
            }
        })
        .collect()
    }

    /// Remove the cluster layer from the map.
    pub fn dispose<E: MapEngine>(mut self, engine: &mut E) {
        self.entries.clear();
        engine.remove_layer(self.layer);
        debug!("[MarkerManager] Disposed layer {:?}", self.layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_engine::RecordingMapEngine;
    use crate::plaque::CoordinateValue;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample_plaques() -> Vec<PlaqueRecord> {
        vec![
            PlaqueRecord::new(1, "Charles Dickens", 51.5235, -0.1161).with_profession("novelist"),
            PlaqueRecord::new(2, "Ada Lovelace", 51.5074, -0.1440).with_visited(true),
            PlaqueRecord::new(3, "Isaac Newton", 51.5098, -0.1318),
        ]
    }

    async fn attached(engine: &mut RecordingMapEngine) -> MarkerManager {
        MarkerManager::attach(engine, MarkerConfig::default(), MarkerCallbacks::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rebuild_renders_one_marker_per_plaque() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let favorites = HashSet::from([3]);
        let plaques = sample_plaques();

        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: Some(1),
                routing_mode: false,
            },
        );

        assert_eq!(report.rendered, 3);
        assert_eq!(manager.marker_ids(), vec![1, 2, 3]);
        assert_eq!(engine.markers(manager.layer()).len(), 3);
        assert_eq!(engine.marker_batches(), 1);

        let dickens = manager.get(1).unwrap();
        assert!(dickens.icon.selected);
        assert_eq!(dickens.icon.size_px, 40);
        assert!(dickens.in_cluster_layer);
        assert!(manager.get(2).unwrap().icon.visited);
        assert!(manager.get(3).unwrap().icon.favorite);
    }

    #[tokio::test]
    async fn test_invalid_coordinates_skipped() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let mut plaques = sample_plaques();
        plaques[1].latitude = Some(CoordinateValue::Text("not a number".to_string()));
        plaques.push(PlaqueRecord {
            longitude: None,
            ..PlaqueRecord::new(4, "Missing", 51.5, -0.1)
        });

        let favorites = HashSet::new();
        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );

        assert_eq!(report.skipped, vec![2, 4]);
        assert_eq!(manager.marker_ids(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let mut plaques = sample_plaques();
        plaques.push(PlaqueRecord::new(1, "Impostor", 40.0, -70.0));

        let favorites = HashSet::new();
        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );
        assert_eq!(report.duplicates, 1);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.get(1).unwrap().plaque.title, "Charles Dickens");
    }

    #[tokio::test]
    async fn test_duplicate_after_skipped_record_stays_skipped() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let mut broken = PlaqueRecord::new(7, "Broken", 51.5, -0.1);
        broken.latitude = None;
        let plaques = vec![broken, PlaqueRecord::new(7, "Later copy", 51.5, -0.1)];

        let favorites = HashSet::new();
        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );
        assert_eq!(report.skipped, vec![7]);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rendered, 0);
        assert!(manager.get(7).is_none());
        assert!(engine.markers(manager.layer()).is_empty());
    }

    #[tokio::test]
    async fn test_construction_failure_does_not_abort_batch() {
        let mut engine = RecordingMapEngine::new();
        let config = MarkerConfig {
            selected_marker_size: 0,
            ..MarkerConfig::default()
        };
        let mut manager = MarkerManager::attach(&mut engine, config, MarkerCallbacks::new())
            .await
            .unwrap();
        let plaques = sample_plaques();
        let favorites = HashSet::new();

        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: Some(2),
                routing_mode: false,
            },
        );
        assert_eq!(report.failed, vec![2]);
        assert_eq!(manager.marker_ids(), vec![1, 3]);
        assert_eq!(engine.markers(manager.layer()).len(), 2);
    }

    #[tokio::test]
    async fn test_fit_only_on_first_population() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let plaques = sample_plaques();
        let favorites = HashSet::new();
        let inputs = MarkerInputs {
            plaques: &plaques,
            favorites: &favorites,
            selected_id: None,
            routing_mode: false,
        };

        assert!(manager.rebuild(&mut engine, inputs).fitted);
        assert_eq!(engine.fits()[0].1, (50, 50));
        assert!(!manager.rebuild(&mut engine, inputs).fitted);
        assert_eq!(engine.fits().len(), 1);

        manager.request_fit();
        assert!(manager.rebuild(&mut engine, inputs).fitted);
        assert_eq!(engine.fits().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_list_does_not_fit() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let favorites = HashSet::new();
        let report = manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &[],
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );
        assert!(!report.fitted);
        assert!(manager.is_empty());
        assert!(manager.last_view_state().is_none());
    }

    #[tokio::test]
    async fn test_sync_skips_unchanged_inputs() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let plaques = sample_plaques();
        let mut favorites = HashSet::new();

        let inputs = MarkerInputs {
            plaques: &plaques,
            favorites: &favorites,
            selected_id: None,
            routing_mode: false,
        };
        assert!(manager.sync(&mut engine, inputs).is_some());
        assert!(manager.sync(&mut engine, inputs).is_none());
        assert_eq!(engine.marker_batches(), 1);

        favorites.insert(2);
        let changed = MarkerInputs {
            plaques: &plaques,
            favorites: &favorites,
            selected_id: None,
            routing_mode: false,
        };
        assert!(manager.sync(&mut engine, changed).is_some());
        assert!(manager.get(2).unwrap().icon.favorite);
        assert_eq!(engine.markers(manager.layer()).len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_invokes_callbacks() {
        let mut engine = RecordingMapEngine::new();
        let viewed = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(RefCell::new(Vec::new()));
        let callbacks = {
            let viewed = Rc::clone(&viewed);
            let added = Rc::clone(&added);
            MarkerCallbacks::new()
                .on_marker_click(move |p| viewed.borrow_mut().push(p.id))
                .on_add_to_route(move |p| added.borrow_mut().push(p.id))
        };
        let mut manager = MarkerManager::attach(&mut engine, MarkerConfig::default(), callbacks)
            .await
            .unwrap();
        let plaques = sample_plaques();
        let favorites = HashSet::new();

        manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );
        let popup = &engine.markers(manager.layer())[0].popup;
        assert_eq!(popup.actions, vec![PopupAction::ViewDetails]);

        assert!(manager.dispatch(MarkerEvent {
            plaque_id: 2,
            action: PopupAction::ViewDetails
        }));
        assert!(!manager.dispatch(MarkerEvent {
            plaque_id: 2,
            action: PopupAction::AddToRoute
        }));

        manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: true,
            },
        );
        assert!(engine.markers(manager.layer())[0]
            .popup
            .actions
            .contains(&PopupAction::AddToRoute));
        assert!(manager.dispatch(MarkerEvent {
            plaque_id: 3,
            action: PopupAction::AddToRoute
        }));
        assert!(!manager.dispatch(MarkerEvent {
            plaque_id: 99,
            action: PopupAction::ViewDetails
        }));

        assert_eq!(*viewed.borrow(), vec![2]);
        assert_eq!(*added.borrow(), vec![3]);
    }

    #[tokio::test]
    async fn test_clusters_use_renderer() {
        let mut engine = RecordingMapEngine::new();
        let mut manager = attached(&mut engine).await;
        let plaques = sample_plaques();
        let favorites = HashSet::new();
        manager.rebuild(
            &mut engine,
            MarkerInputs {
                plaques: &plaques,
                favorites: &favorites,
                selected_id: None,
                routing_mode: false,
            },
        );

        let clusters = manager.clusters(10);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].icon.label, "3");
        assert!(matches!(
            clusters[0].preview,
            ClusterPreview::Titles { remaining: 0, .. }
        ));

        assert_eq!(manager.clusters(18).len(), 3);
    }

    #[tokio::test]
    async fn test_dispose_removes_layer() {
        let mut engine = RecordingMapEngine::new();
        let manager = attached(&mut engine).await;
        assert_eq!(engine.layer_count(), 1);
        manager.dispose(&mut engine);
        assert_eq!(engine.layer_count(), 0);
    }
}
