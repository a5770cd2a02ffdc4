//! # Cluster Icons and Clustering
//!
//! Pure functions mapping a cluster's member count and members to an icon and
//! a hover preview, plus greedy pixel-radius clustering of marker positions.
//!
//! Icon tiers keep the label legible across very different densities:
//!
//! | Members | Tier | Icon | Font |
//! |---|---|---|---|
//! | < 6 | small | 40 px | 14 px |
//! | < 21 | medium | 50 px | 16 px |
//! | < 100 | large | 60 px | 18 px |
//! | otherwise | extra-large | 70 px | 20 px |
//!
//! Previews list titles for small clusters and switch to a per-profession
//! summary once a cluster is too large for a title list to be useful.

use std::collections::{HashMap, HashSet};

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::config::MarkerConfig;
use crate::geo_utils::project_to_pixels;
use crate::plaque::{PlaqueId, PlaqueRecord};
use crate::{Bounds, GpsPoint};

/// Largest count shown verbatim in a cluster label.
pub const MAX_LABEL_COUNT: usize = 999;

/// Visual size tier of a cluster icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterTier {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl ClusterTier {
    pub fn for_count(count: usize) -> Self {
        if count < 6 {
            ClusterTier::Small
        } else if count < 21 {
            ClusterTier::Medium
        } else if count < 100 {
            ClusterTier::Large
        } else {
            ClusterTier::ExtraLarge
        }
    }

    pub fn icon_size_px(&self) -> u32 {
        match self {
            ClusterTier::Small => 40,
            ClusterTier::Medium => 50,
            ClusterTier::Large => 60,
            ClusterTier::ExtraLarge => 70,
        }
    }

    pub fn font_size_px(&self) -> u32 {
        match self {
            ClusterTier::Small => 14,
            ClusterTier::Medium => 16,
            ClusterTier::Large => 18,
            ClusterTier::ExtraLarge => 20,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ClusterTier::Small => "cluster-small",
            ClusterTier::Medium => "cluster-medium",
            ClusterTier::Large => "cluster-large",
            ClusterTier::ExtraLarge => "cluster-xlarge",
        }
    }
}

/// Rendered cluster icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIcon {
    pub tier: ClusterTier,
    pub size_px: u32,
    pub font_size_px: u32,
    pub label: String,
}

/// Hover summary for a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterPreview {
    /// Individual titles, with the number of members not listed
    Titles { titles: Vec<String>, remaining: usize },
    /// Most common professions with member counts, with the number of
    /// categories not listed
    Categories {
        top: Vec<(String, usize)>,
        remaining_categories: usize,
    },
}

impl ClusterPreview {
    /// One-line text form of the preview.
    pub fn summary(&self) -> String {
        match self {
            ClusterPreview::Titles { titles, remaining } => {
                let mut text = titles.join(", ");
                if *remaining > 0 {
                    text.push_str(&format!(" +{} more", remaining));
                }
                text
            }
            ClusterPreview::Categories {
                top,
                remaining_categories,
            } => {
                let mut text = top
                    .iter()
                    .map(|(name, count)| format!("{} ({})", name, count))
                    .collect::<Vec<_>>()
                    .join(", ");
                if *remaining_categories > 0 {
                    text.push_str(&format!(" +{} more categories", remaining_categories));
                }
                text
            }
        }
    }
}

/// Cluster icon and preview renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRenderer {
    /// Titles listed in a small cluster's preview
    pub title_limit: usize,
    /// Member count above which previews aggregate by profession
    pub category_threshold: usize,
    /// Professions listed in an aggregated preview
    pub top_categories: usize,
}

impl Default for ClusterRenderer {
    fn default() -> Self {
        Self::from_config(&MarkerConfig::default())
    }
}

impl ClusterRenderer {
    pub fn from_config(config: &MarkerConfig) -> Self {
        Self {
            title_limit: config.preview_title_limit,
            category_threshold: config.preview_category_threshold,
            top_categories: config.preview_top_categories,
        }
    }

    pub fn size_for(&self, count: usize) -> ClusterTier {
        ClusterTier::for_count(count)
    }

    pub fn label_for(&self, count: usize) -> String {
        if count > MAX_LABEL_COUNT {
            format!("{}+", MAX_LABEL_COUNT)
        } else {
            count.to_string()
        }
    }

    pub fn icon_for(&self, count: usize) -> ClusterIcon {
        let tier = self.size_for(count);
        ClusterIcon {
            tier,
            size_px: tier.icon_size_px(),
            font_size_px: tier.font_size_px(),
            label: self.label_for(count),
        }
    }

    pub fn preview_for(&self, members: &[&PlaqueRecord]) -> ClusterPreview {
        if members.len() <= self.category_threshold {
            let titles: Vec<String> = members
                .iter()
                .take(self.title_limit)
                .map(|p| p.title.clone())
                .collect();
            let remaining = members.len() - titles.len();
            return ClusterPreview::Titles { titles, remaining };
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for plaque in members {
            let profession = plaque.profession.trim();
            let key = if profession.is_empty() {
                "Unknown"
            } else {
                profession
            };
            *counts.entry(key).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let remaining_categories = ranked.len().saturating_sub(self.top_categories);
        ranked.truncate(self.top_categories);
        ClusterPreview::Categories {
            top: ranked,
            remaining_categories,
        }
    }
}

// ============================================================================
// Clustering
// ============================================================================

/// A group of nearby markers.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCluster {
    /// Member plaque ids, ascending
    pub members: Vec<PlaqueId>,
    /// Mean position of the members
    pub center: GpsPoint,
    pub bounds: Bounds,
}

impl PointCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

type IndexedPixel = GeomWithData<[f64; 2], usize>;

/// Group marker positions that lie within `radius_px` screen pixels of a
/// seed marker at the given zoom.
///
/// Seeds are taken in ascending id order, so the result is deterministic.
/// At or above `max_zoom` every marker is its own cluster.
pub fn cluster_markers(
    points: &[(PlaqueId, GpsPoint)],
    zoom: u8,
    radius_px: f64,
    max_zoom: u8,
) -> Vec<PointCluster> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by_key(|&i| points[i].0);

    if zoom >= max_zoom || radius_px <= 0.0 {
        return order
            .into_iter()
            .map(|i| make_cluster(points, vec![i]))
            .collect();
    }

    let pixels: Vec<IndexedPixel> = points
        .iter()
        .enumerate()
        .map(|(i, (_, p))| GeomWithData::new(project_to_pixels(p, zoom), i))
        .collect();
    let tree = RTree::bulk_load(pixels.clone());
    let radius_sq = radius_px * radius_px;

    let mut assigned: HashSet<usize> = HashSet::with_capacity(points.len());
    let mut clusters = Vec::new();

    for seed in order {
        if assigned.contains(&seed) {
            continue;
        }
        let mut members: Vec<usize> = tree
            .locate_within_distance(*pixels[seed].geom(), radius_sq)
            .map(|g| g.data)
            .filter(|i| !assigned.contains(i))
            .collect();
        if !members.contains(&seed) {
            members.push(seed);
        }
        assigned.extend(members.iter().copied());
        clusters.push(make_cluster(points, members));
    }

    clusters
}

fn make_cluster(points: &[(PlaqueId, GpsPoint)], indices: Vec<usize>) -> PointCluster {
    let positions: Vec<GpsPoint> = indices.iter().map(|&i| points[i].1).collect();
    let n = positions.len().max(1) as f64;
    let center = GpsPoint::new(
        positions.iter().map(|p| p.latitude).sum::<f64>() / n,
        positions.iter().map(|p| p.longitude).sum::<f64>() / n,
    );
    let bounds = Bounds::from_points(&positions).unwrap_or(Bounds {
        min_lat: center.latitude,
        max_lat: center.latitude,
        min_lng: center.longitude,
        max_lng: center.longitude,
    });
    let mut members: Vec<PlaqueId> = indices.iter().map(|&i| points[i].0).collect();
    members.sort_unstable();

    PointCluster {
        members,
        center,
        bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plaques(n: usize, professions: &[&str]) -> Vec<PlaqueRecord> {
        (0..n)
            .map(|i| {
                PlaqueRecord::new(i as PlaqueId, format!("Plaque {}", i), 51.5, -0.12)
                    .with_profession(professions[i % professions.len()])
            })
            .collect()
    }

    #[test]
    fn test_size_tiers() {
        let renderer = ClusterRenderer::default();
        assert_eq!(renderer.size_for(3), ClusterTier::Small);
        assert_eq!(renderer.size_for(5), ClusterTier::Small);
        assert_eq!(renderer.size_for(6), ClusterTier::Medium);
        assert_eq!(renderer.size_for(20), ClusterTier::Medium);
        assert_eq!(renderer.size_for(25), ClusterTier::Large);
        assert_eq!(renderer.size_for(99), ClusterTier::Large);
        assert_eq!(renderer.size_for(150), ClusterTier::ExtraLarge);
    }

    #[test]
    fn test_labels_cap_above_999() {
        let renderer = ClusterRenderer::default();
        assert_eq!(renderer.label_for(150), "150");
        assert_eq!(renderer.label_for(999), "999");
        assert_eq!(renderer.label_for(1000), "999+");
        assert_eq!(renderer.label_for(1200), "999+");

        let icon = renderer.icon_for(1200);
        assert_eq!(icon.tier, ClusterTier::ExtraLarge);
        assert_eq!(icon.size_px, 70);
        assert_eq!(icon.label, "999+");
    }

    #[test]
    fn test_small_cluster_lists_titles() {
        let renderer = ClusterRenderer::default();
        let records = plaques(8, &["poet"]);
        let members: Vec<&PlaqueRecord> = records.iter().collect();

        let preview = renderer.preview_for(&members);
        match &preview {
            ClusterPreview::Titles { titles, remaining } => {
                assert_eq!(titles.len(), 5);
                assert_eq!(*remaining, 3);
            }
            other => panic!("expected titles, got {:?}", other),
        }
        assert!(preview.summary().ends_with("Plaque 4 +3 more"));

        let few: Vec<&PlaqueRecord> = records.iter().take(2).collect();
        assert_eq!(renderer.preview_for(&few).summary(), "Plaque 0, Plaque 1");
    }

    #[test]
    fn test_large_cluster_aggregates_categories() {
        let renderer = ClusterRenderer::default();
        let mut records = plaques(60, &["novelist", "poet", "scientist", "actor", "engineer", "painter"]);
        // Make novelists the clear leader
        for p in records.iter_mut().take(12) {
            p.profession = "novelist".to_string();
        }
        let members: Vec<&PlaqueRecord> = records.iter().collect();

        match renderer.preview_for(&members) {
            ClusterPreview::Categories {
                top,
                remaining_categories,
            } => {
                assert_eq!(top.len(), 4);
                assert_eq!(top[0].0, "novelist");
                assert_eq!(remaining_categories, 2);
                let listed: usize = top.iter().map(|(_, c)| c).sum();
                assert!(listed <= 60);
            }
            other => panic!("expected categories, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let renderer = ClusterRenderer::default();
        let records = plaques(50, &["poet"]);
        let members: Vec<&PlaqueRecord> = records.iter().collect();
        assert!(matches!(
            renderer.preview_for(&members),
            ClusterPreview::Titles { .. }
        ));
    }

    #[test]
    fn test_cluster_markers_groups_nearby_points() {
        let points = vec![
            (3, GpsPoint::new(51.5074, -0.1278)),
            (1, GpsPoint::new(51.5075, -0.1279)),
            (2, GpsPoint::new(51.5076, -0.1277)),
            (4, GpsPoint::new(48.8566, 2.3522)),
        ];

        let clusters = cluster_markers(&points, 12, 80.0, 18);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![1, 2, 3]);
        assert_eq!(clusters[1].members, vec![4]);

        let total: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn test_no_clustering_at_max_zoom() {
        let points = vec![
            (1, GpsPoint::new(51.5074, -0.1278)),
            (2, GpsPoint::new(51.5074, -0.1278)),
        ];
        let clusters = cluster_markers(&points, 18, 80.0, 18);
        assert_eq!(clusters.len(), 2);
        assert!(cluster_markers(&[], 10, 80.0, 18).is_empty());
    }
}
