//! Rendering surface abstraction.
//!
//! [`MapSurface`] is the narrow set of map-engine operations the reconciler
//! and pointer handling need. [`HeadlessSurface`] keeps everything in memory:
//! sources are queryable as soon as they are added and style loads complete
//! synchronously, signalled through its event bus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use foundation::bounds::LonLatBounds;
use runtime::event_bus::EventBus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use streaming::protocol::{Feature, FeatureCollection, Geometry, Position};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub paint: Map<String, Value>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, source: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            kind,
            paint: Map::new(),
        }
    }

    pub fn with_paint(mut self, name: &str, value: Value) -> Self {
        self.paint.insert(name.to_string(), value);
        self
    }

    pub fn paint(&self, name: &str) -> Option<&Value> {
        self.paint.get(name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// `[lon, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
}

impl Viewport {
    pub fn new(center: [f64; 2], zoom: f64) -> Self {
        Self { center, zoom }
    }
}

impl Default for Viewport {
    /// Contiguous United States.
    fn default() -> Self {
        Self::new([-98.5795, 39.8283], 3.5)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FitOptions {
    /// Screen-space padding in pixels.
    pub padding: f64,
    pub duration_ms: u64,
}

/// Base map raster style.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapStyle {
    #[default]
    Streets,
    Terrain,
    Satellite,
}

impl MapStyle {
    pub const ALL: [MapStyle; 3] = [MapStyle::Streets, MapStyle::Terrain, MapStyle::Satellite];

    pub fn as_str(self) -> &'static str {
        match self {
            MapStyle::Streets => "streets",
            MapStyle::Terrain => "terrain",
            MapStyle::Satellite => "satellite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    pub fn tile_url(self) -> &'static str {
        match self {
            MapStyle::Streets => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            MapStyle::Terrain => "https://tile.opentopomap.org/{z}/{x}/{y}.png",
            MapStyle::Satellite => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
        }
    }

    pub fn attribution(self) -> &'static str {
        match self {
            MapStyle::Streets => "© OpenStreetMap contributors",
            MapStyle::Terrain => "© OpenTopoMap contributors",
            MapStyle::Satellite => "© ESRI",
        }
    }

    pub fn max_zoom(self) -> u8 {
        match self {
            MapStyle::Streets => 22,
            MapStyle::Terrain => 17,
            MapStyle::Satellite => 19,
        }
    }

    /// Style document with a single raster base layer.
    pub fn to_style_json(self) -> Value {
        json!({
            "version": 8,
            "sources": {
                "raster-tiles": {
                    "type": "raster",
                    "tiles": [self.tile_url()],
                    "tileSize": 256,
                    "attribution": self.attribution(),
                }
            },
            "layers": [{
                "id": "simple-tiles",
                "type": "raster",
                "source": "raster-tiles",
                "minzoom": 0,
                "maxzoom": self.max_zoom(),
            }]
        })
    }
}

impl std::fmt::Display for MapStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Initial load finished; sources and layers may be added.
    Loaded,
    /// A style swap finished; every caller-added source and layer is gone.
    StyleLoaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    DuplicateSource(String),
    MissingSource(String),
    /// A layer still references the source.
    SourceInUse { source: String, layer: String },
    DuplicateLayer(String),
    MissingLayer(String),
    Rejected(String),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            SurfaceError::MissingSource(id) => write!(f, "no such source: {id}"),
            SurfaceError::SourceInUse { source, layer } => {
                write!(f, "source {source} is still used by layer {layer}")
            }
            SurfaceError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            SurfaceError::MissingLayer(id) => write!(f, "no such layer: {id}"),
            SurfaceError::Rejected(msg) => write!(f, "rejected by surface: {msg}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// A feature hit by a point query, tagged with the layer that rendered it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer_id: String,
    pub feature: Feature,
}

pub trait MapSurface: Send {
    fn is_loaded(&self) -> bool;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), SurfaceError>;
    fn set_source_data(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), SurfaceError>;
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn set_paint_property(&mut self, layer_id: &str, name: &str, value: Value) -> Result<(), SurfaceError>;

    /// Features under `point` (`[lon, lat]`) in the given layers, topmost first.
    fn query_rendered_features(&self, point: Position, layers: &[String]) -> Vec<RenderedFeature>;

    fn viewport(&self) -> Viewport;
    fn set_viewport(&mut self, viewport: Viewport);
    fn fit_bounds(&mut self, bounds: LonLatBounds, options: FitOptions);
    fn fly_to(&mut self, center: Position, zoom: f64);

    /// Replaces the base style, discarding every caller-added source and
    /// layer. Completion is signalled with [`SurfaceEvent::StyleLoaded`].
    fn set_style(&mut self, style: MapStyle);

    /// Drains pending load and style-load signals.
    fn take_events(&mut self) -> Vec<SurfaceEvent>;
}

/// In-memory surface for tests, tools, and server-side rendering.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    loaded: bool,
    style: MapStyle,
    viewport: Viewport,
    sources: HashMap<String, Arc<FeatureCollection>>,
    /// Bottom to top.
    layers: Vec<LayerSpec>,
    events: EventBus<SurfaceEvent>,
    rejected: HashSet<String>,
    last_fit: Option<(LonLatBounds, FitOptions)>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the surface loaded and signals it.
    pub fn finish_loading(&mut self) {
        self.loaded = true;
        self.events.emit(SurfaceEvent::Loaded);
    }

    /// Makes every later `add_layer` for `layer_id` fail.
    pub fn reject_layer(&mut self, layer_id: &str) {
        self.rejected.insert(layer_id.to_string());
    }

    pub fn style(&self) -> MapStyle {
        self.style
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn source_data(&self, id: &str) -> Option<&Arc<FeatureCollection>> {
        self.sources.get(id)
    }

    pub fn last_fit(&self) -> Option<(LonLatBounds, FitOptions)> {
        self.last_fit
    }
}

impl MapSurface for HeadlessSurface {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), SurfaceError> {
        if self.sources.contains_key(id) {
            return Err(SurfaceError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), SurfaceError> {
        let slot = self
            .sources
            .get_mut(id)
            .ok_or_else(|| SurfaceError::MissingSource(id.to_string()))?;
        *slot = data;
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        if let Some(layer) = self.layers.iter().find(|l| l.source == id) {
            return Err(SurfaceError::SourceInUse {
                source: id.to_string(),
                layer: layer.id.clone(),
            });
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SurfaceError::MissingSource(id.to_string()))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError> {
        if self.has_layer(&layer.id) {
            return Err(SurfaceError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::MissingSource(layer.source));
        }
        if self.rejected.contains(&layer.id) {
            return Err(SurfaceError::Rejected(format!("layer {}", layer.id)));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        let idx = self
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| SurfaceError::MissingLayer(id.to_string()))?;
        self.layers.remove(idx);
        Ok(())
    }

    fn set_paint_property(&mut self, layer_id: &str, name: &str, value: Value) -> Result<(), SurfaceError> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id == layer_id)
            .ok_or_else(|| SurfaceError::MissingLayer(layer_id.to_string()))?;
        layer.paint.insert(name.to_string(), value);
        Ok(())
    }

    fn query_rendered_features(&self, point: Position, layers: &[String]) -> Vec<RenderedFeature> {
        let mut hits = Vec::new();
        for layer in self.layers.iter().rev() {
            if !layers.iter().any(|id| *id == layer.id) {
                continue;
            }
            let Some(source) = self.sources.get(&layer.source) else {
                continue;
            };
            for feature in &source.features {
                if geometry_contains(&feature.geometry, point) {
                    hits.push(RenderedFeature {
                        layer_id: layer.id.clone(),
                        feature: feature.clone(),
                    });
                }
            }
        }
        hits
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn fit_bounds(&mut self, bounds: LonLatBounds, options: FitOptions) {
        let extent = (bounds.max[0] - bounds.min[0])
            .max(bounds.max[1] - bounds.min[1])
            .max(1e-6);
        let zoom = (360.0 / extent).log2().clamp(0.0, f64::from(self.style.max_zoom()));
        self.viewport = Viewport::new(bounds.center(), zoom);
        self.last_fit = Some((bounds, options));
    }

    fn fly_to(&mut self, center: Position, zoom: f64) {
        self.viewport = Viewport::new(center, zoom);
    }

    /// The camera returns to the style's default view, as with a freshly
    /// loaded style document.
    fn set_style(&mut self, style: MapStyle) {
        self.style = style;
        self.sources.clear();
        self.layers.clear();
        self.viewport = Viewport::default();
        self.events.emit(SurfaceEvent::StyleLoaded);
    }

    fn take_events(&mut self) -> Vec<SurfaceEvent> {
        self.events.drain().into_iter().map(|s| s.event).collect()
    }
}

fn geometry_contains(geometry: &Geometry, point: Position) -> bool {
    match geometry {
        Geometry::Polygon { coordinates } => polygon_contains(coordinates, point),
        Geometry::MultiPolygon { coordinates } => coordinates.iter().any(|p| polygon_contains(p, point)),
    }
}

// First ring is the exterior, the rest are holes.
fn polygon_contains(rings: &[Vec<Position>], point: Position) -> bool {
    let Some((outer, holes)) = rings.split_first() else {
        return false;
    };
    ring_contains(outer, point) && !holes.iter().any(|h| ring_contains(h, point))
}

// Even-odd ray casting.
fn ring_contains(ring: &[Position], [x, y]: Position) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
