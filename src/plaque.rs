//! Plaque records and dataset loading.
//!
//! Plaque records are read-only to the map core. Coordinates arrive as JSON
//! numbers or numeric strings and may be missing or malformed; such plaques
//! are kept but reported as unplottable.

use std::fmt;
use std::path::Path;

use log::{debug, info, warn};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{OptionExt, Result};
use crate::geo_utils::parse_coordinate;
use crate::GpsPoint;

/// Stable, externally assigned plaque identifier.
pub type PlaqueId = i64;

/// A raw coordinate as found in the dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CoordinateValue {
    Number(f64),
    Text(String),
    /// Present but neither a number nor a string (bool, object, ...)
    #[default]
    Invalid,
}

impl From<f64> for CoordinateValue {
    fn from(value: f64) -> Self {
        CoordinateValue::Number(value)
    }
}

impl From<&str> for CoordinateValue {
    fn from(value: &str) -> Self {
        CoordinateValue::Text(value.to_string())
    }
}

impl<'de> Deserialize<'de> for CoordinateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(CoordinateValue::Number)
                .unwrap_or(CoordinateValue::Invalid),
            serde_json::Value::String(s) => CoordinateValue::Text(s),
            _ => CoordinateValue::Invalid,
        })
    }
}

impl Serialize for CoordinateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CoordinateValue::Number(n) => serializer.serialize_f64(*n),
            CoordinateValue::Text(s) => serializer.serialize_str(s),
            CoordinateValue::Invalid => serializer.serialize_none(),
        }
    }
}

/// Plaque colour category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaqueColor {
    #[default]
    Blue,
    Green,
    Brown,
    Black,
    Grey,
}

impl PlaqueColor {
    /// Parse a colour name, falling back to blue for anything unrecognised.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "green" => PlaqueColor::Green,
            "brown" => PlaqueColor::Brown,
            "black" => PlaqueColor::Black,
            "grey" | "gray" => PlaqueColor::Grey,
            _ => PlaqueColor::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaqueColor::Blue => "blue",
            PlaqueColor::Green => "green",
            PlaqueColor::Brown => "brown",
            PlaqueColor::Black => "black",
            PlaqueColor::Grey => "grey",
        }
    }
}

impl fmt::Display for PlaqueColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlaqueColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value.as_str().map(PlaqueColor::parse).unwrap_or_default())
    }
}

fn default_profession() -> String {
    "Unknown".to_string()
}

/// One physical plaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawPlaqueRecord")]
pub struct PlaqueRecord {
    pub id: PlaqueId,
    pub title: String,
    pub latitude: Option<CoordinateValue>,
    pub longitude: Option<CoordinateValue>,
    pub location: Option<String>,
    pub color: PlaqueColor,
    pub profession: String,
    pub visited: bool,
    pub is_favorite: bool,
}

/// Wire form of a plaque record. Every field except `id` is read as loose
/// JSON so one odd attribute never costs the record.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaqueRecord {
    id: PlaqueId,
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default)]
    latitude: Option<CoordinateValue>,
    #[serde(default)]
    longitude: Option<CoordinateValue>,
    #[serde(default)]
    location: Option<serde_json::Value>,
    #[serde(default)]
    address: Option<serde_json::Value>,
    #[serde(default)]
    color: Option<serde_json::Value>,
    #[serde(default)]
    colour: Option<serde_json::Value>,
    #[serde(default)]
    profession: Option<serde_json::Value>,
    #[serde(default)]
    visited: Option<serde_json::Value>,
    #[serde(default)]
    is_favorite: Option<serde_json::Value>,
}

fn loose_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn loose_flag(value: Option<serde_json::Value>) -> bool {
    matches!(value, Some(serde_json::Value::Bool(true)))
}

impl From<RawPlaqueRecord> for PlaqueRecord {
    fn from(raw: RawPlaqueRecord) -> Self {
        let color = loose_text(raw.color)
            .or_else(|| loose_text(raw.colour))
            .map(|name| PlaqueColor::parse(&name))
            .unwrap_or_default();
        let profession = loose_text(raw.profession)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(default_profession);

        Self {
            id: raw.id,
            title: loose_text(raw.title).unwrap_or_default(),
            latitude: raw.latitude,
            longitude: raw.longitude,
            location: loose_text(raw.location).or_else(|| loose_text(raw.address)),
            color,
            profession,
            visited: loose_flag(raw.visited),
            is_favorite: loose_flag(raw.is_favorite),
        }
    }
}

impl PlaqueRecord {
    /// Create a plaque with numeric coordinates and default attributes.
    pub fn new(id: PlaqueId, title: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            title: title.into(),
            latitude: Some(CoordinateValue::Number(latitude)),
            longitude: Some(CoordinateValue::Number(longitude)),
            location: None,
            color: PlaqueColor::default(),
            profession: default_profession(),
            visited: false,
            is_favorite: false,
        }
    }

    pub fn with_profession(mut self, profession: impl Into<String>) -> Self {
        self.profession = profession.into();
        self
    }

    pub fn with_color(mut self, color: PlaqueColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_visited(mut self, visited: bool) -> Self {
        self.visited = visited;
        self
    }

    /// Parsed, validated position of the plaque.
    ///
    /// Fails with `InvalidCoordinates` if either coordinate is missing,
    /// non-numeric, non-finite or out of range.
    pub fn position(&self) -> Result<GpsPoint> {
        let lat = self
            .latitude
            .as_ref()
            .and_then(parse_coordinate)
            .ok_or_invalid_coordinates(self.id, "latitude missing or not a number")?;
        let lng = self
            .longitude
            .as_ref()
            .and_then(parse_coordinate)
            .ok_or_invalid_coordinates(self.id, "longitude missing or not a number")?;

        Some(GpsPoint::new(lat, lng))
            .filter(|p| p.is_valid())
            .ok_or_invalid_coordinates(self.id, "coordinates out of range")
    }

    /// Whether the plaque can be placed on the map.
    pub fn is_plottable(&self) -> bool {
        self.position().is_ok()
    }
}

/// Parse a JSON array of plaque records.
///
/// Only a document that is not a JSON array fails. Records without a usable
/// integer `id` are logged and dropped.
pub fn load_plaques_from_str(json: &str) -> Result<Vec<PlaqueRecord>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut plaques = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<PlaqueRecord>(value) {
            Ok(plaque) => plaques.push(plaque),
            Err(e) => warn!("[Dataset] Dropping record {}: {}", index, e),
        }
    }
    let unplottable = plaques.iter().filter(|p| !p.is_plottable()).count();
    if unplottable > 0 {
        debug!(
            "[Dataset] {} of {} plaques have no usable coordinates",
            unplottable,
            plaques.len()
        );
    }
    Ok(plaques)
}

/// Read and parse a JSON plaque dataset from disk.
pub fn load_plaques_from_path(path: impl AsRef<Path>) -> Result<Vec<PlaqueRecord>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let plaques = load_plaques_from_str(&json)?;
    info!(
        "[Dataset] Loaded {} plaques from {}",
        plaques.len(),
        path.display()
    );
    Ok(plaques)
}
