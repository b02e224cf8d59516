//! Pointer hover and click handling over the active metric layers.

use catalog::{MetricKind, format_metric_value};
use foundation::bounds::LonLatBounds;
use runtime::debounce::Debouncer;
use serde::Serialize;
use streaming::protocol::Position;
use tracing::debug;

use crate::reconciler::{ActiveLayerSet, LayerReconciler};
use crate::surface::{FitOptions, MapSurface, RenderedFeature};

/// Camera animation used when a region is clicked.
pub const CLICK_FIT: FitOptions = FitOptions {
    padding: 50.0,
    duration_ms: 1000,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DebounceConfig {
    pub quiet_ms: u64,
}

impl Default for DebounceConfig {
    /// About one frame.
    fn default() -> Self {
        Self { quiet_ms: 16 }
    }
}

/// What the pointer is over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoverInfo {
    pub metric: MetricKind,
    pub region_id: String,
    pub name: String,
    pub value: Option<f64>,
    pub formatted: String,
}

// Active layers the surface still has; the two can drift during a swap.
fn queryable_layers<S: MapSurface>(surface: &S, active: &ActiveLayerSet) -> Vec<String> {
    active
        .layer_ids()
        .into_iter()
        .filter(|id| surface.has_layer(id))
        .collect()
}

fn top_hit<S: MapSurface>(surface: &S, active: &ActiveLayerSet, point: Position) -> Option<RenderedFeature> {
    let layers = queryable_layers(surface, active);
    if layers.is_empty() {
        return None;
    }
    surface.query_rendered_features(point, &layers).into_iter().next()
}

pub fn hover_at<S: MapSurface>(surface: &S, active: &ActiveLayerSet, point: Position) -> Option<HoverInfo> {
    let hit = top_hit(surface, active, point)?;
    let metric = MetricKind::parse(&hit.layer_id).ok()?;
    let props = hit.feature.properties;
    Some(HoverInfo {
        metric,
        formatted: format_metric_value(props.value, metric),
        region_id: props.id,
        name: props.name,
        value: props.value,
    })
}

/// Fits the camera to the clicked region's outer ring.
pub fn click_at<S: MapSurface>(surface: &mut S, active: &ActiveLayerSet, point: Position) -> Option<LonLatBounds> {
    let hit = top_hit(surface, active, point)?;
    let ring = hit.feature.geometry.outer_ring()?;
    let bounds = LonLatBounds::from_positions(ring.iter())?;
    debug!("fitting to {} ({})", hit.feature.properties.name, hit.layer_id);
    surface.fit_bounds(bounds, CLICK_FIT);
    Some(bounds)
}

/// Coalesces pointer moves so the surface is queried at most once per quiet
/// window.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    moves: Debouncer<Position>,
    hovered: Option<HoverInfo>,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

impl PointerTracker {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            moves: Debouncer::new(config.quiet_ms),
            hovered: None,
        }
    }

    pub fn on_move(&mut self, point: Position, now_ms: u64) {
        self.moves.push(point, now_ms);
    }

    pub fn on_leave(&mut self) {
        self.moves.cancel();
        self.hovered = None;
    }

    /// When the next [`Self::flush`] can do work.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.moves.deadline_ms()
    }

    /// Resolves the latest pointer position once it has settled. Returns
    /// `true` if a query ran.
    pub fn flush<S: MapSurface>(&mut self, now_ms: u64, surface: &S, active: &ActiveLayerSet) -> bool {
        let Some(point) = self.moves.poll(now_ms) else {
            return false;
        };
        self.hovered = hover_at(surface, active, point);
        true
    }

    pub fn hovered(&self) -> Option<&HoverInfo> {
        self.hovered.as_ref()
    }

    /// Moves dropped in favour of a later one.
    pub fn coalesced(&self) -> u64 {
        self.moves.coalesced()
    }
}

impl<S: MapSurface> LayerReconciler<S> {
    pub fn hover_at(&self, point: Position) -> Option<HoverInfo> {
        hover_at(&*self.surface().lock(), self.active_layers(), point)
    }

    pub fn click_at(&self, point: Position) -> Option<LonLatBounds> {
        click_at(&mut *self.surface().lock(), self.active_layers(), point)
    }

    pub fn flush_pointer(&self, tracker: &mut PointerTracker, now_ms: u64) -> bool {
        tracker.flush(now_ms, &*self.surface().lock(), self.active_layers())
    }
}
