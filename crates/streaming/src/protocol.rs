//! Wire types shared by the market-data server and its clients.
//!
//! Feature collections follow GeoJSON (RFC 7946) restricted to polygonal
//! geometry, with the per-feature property set the map layers expect:
//! `{ id, name, type, value, filter, date }`.

use std::collections::BTreeMap;

use catalog::MetricKind;
use foundation::bounds::LonLatBounds;
use serde::{Deserialize, Serialize};

/// `[lon, lat]`
pub type Position = [f64; 2];
pub type Ring = Vec<Position>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
}

impl Geometry {
    /// Outer ring of the polygon, or of the first polygon of a multipolygon.
    pub fn outer_ring(&self) -> Option<&Ring> {
        match self {
            Geometry::Polygon { coordinates } => coordinates.first(),
            Geometry::MultiPolygon { coordinates } => coordinates.first()?.first(),
        }
    }

    /// Bounds of all outer rings.
    pub fn bounds(&self) -> Option<LonLatBounds> {
        match self {
            Geometry::Polygon { coordinates } => {
                LonLatBounds::from_positions(coordinates.first()?.iter())
            }
            Geometry::MultiPolygon { coordinates } => LonLatBounds::from_positions(
                coordinates.iter().filter_map(|p| p.first()).flatten(),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub id: String,
    pub name: String,
    /// Region type (`state`, `county`, `city`, `zip`).
    #[serde(rename = "type", default)]
    pub region_type: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetricKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: FeatureProperties,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

/// Single-region response of `GET /market-data?regionId=`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    pub id: String,
    pub name: String,
    pub timestamp: String,
    pub metrics: BTreeMap<MetricKind, f64>,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}
