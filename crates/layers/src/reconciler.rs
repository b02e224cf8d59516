//! Keeps the surface's metric layers in step with the selected filters,
//! date, and geographic scope.
//!
//! Decisions live in [`transition`], a pure function from
//! `(state, inputs, event)` to the next state plus a list of [`Effect`]s.
//! [`LayerReconciler`] owns the inputs, executes effects against the surface
//! and the data service, and feeds follow-up events (pass completion) back
//! through the same function.

use std::collections::VecDeque;
use std::sync::Arc;

use catalog::MetricKind;
use foundation::scope::{GeographicScope, ScopeKind};
use foundation::time::parse_iso_date;
use parking_lot::Mutex;
use serde_json::{Value, json};
use streaming::request::{CacheKey, FeatureQuery};
use streaming::service::GeoDataService;
use streaming::source::FetchError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::surface::{LayerKind, LayerSpec, MapStyle, MapSurface, SurfaceError, SurfaceEvent, Viewport};
use crate::symbology::get_color_scale_expression;

pub const FILL_OPACITY: f64 = 0.7;
pub const OUTLINE_COLOR: &str = "rgba(0, 0, 0, 0.5)";

/// Fill layers are named after the metric id.
pub fn fill_layer_id(metric: MetricKind) -> &'static str {
    metric.id()
}

pub fn line_layer_id(metric: MetricKind) -> String {
    format!("{}-line", metric.id())
}

pub fn source_id(metric: MetricKind) -> String {
    format!("source-{}", metric.id())
}

/// Outline width; smaller regions get heavier outlines.
pub fn line_width(scope: ScopeKind) -> f64 {
    match scope {
        ScopeKind::Zipcode => 2.0,
        ScopeKind::City => 1.5,
        ScopeKind::County => 1.0,
        ScopeKind::State | ScopeKind::Country => 0.5,
    }
}

/// Layers successfully rendered by the last committed pass, in filter order,
/// each with the data key it was rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveLayerSet {
    entries: Vec<(MetricKind, CacheKey)>,
}

impl ActiveLayerSet {
    pub fn insert(&mut self, metric: MetricKind, key: CacheKey) {
        match self.entries.iter_mut().find(|(m, _)| *m == metric) {
            Some(entry) => entry.1 = key,
            None => self.entries.push((metric, key)),
        }
    }

    pub fn contains(&self, metric: MetricKind) -> bool {
        self.entries.iter().any(|(m, _)| *m == metric)
    }

    pub fn key_for(&self, metric: MetricKind) -> Option<&CacheKey> {
        self.entries.iter().find(|(m, _)| *m == metric).map(|(_, k)| k)
    }

    pub fn ids(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.entries.iter().map(|(m, _)| *m)
    }

    pub fn first(&self) -> Option<MetricKind> {
        self.entries.first().map(|(m, _)| *m)
    }

    /// Fill layer ids, for surface queries.
    pub fn layer_ids(&self) -> Vec<String> {
        self.ids().map(|m| fill_layer_id(m).to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerEvent {
    SurfaceLoaded,
    FiltersChanged(Vec<MetricKind>),
    DateChanged(String),
    ScopeChanged(GeographicScope),
    StyleSwapRequested(MapStyle),
    StyleLoaded,
    PassCompleted { pass: u64, applied: Vec<MetricKind> },
    LegendSelected(MetricKind),
}

impl From<SurfaceEvent> for ReconcilerEvent {
    fn from(event: SurfaceEvent) -> Self {
        match event {
            SurfaceEvent::Loaded => ReconcilerEvent::SurfaceLoaded,
            SurfaceEvent::StyleLoaded => ReconcilerEvent::StyleLoaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerState {
    Idle,
    Reconciling { pass: u64 },
    /// Waiting for the new style; `viewport` is the camera before the swap.
    RecoveringFromStyleSwap { style: MapStyle, viewport: Viewport },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Reconcile the surface. A recovering pass treats every layer as absent.
    RunPass { pass: u64, recovering: bool },
    ApplyStyle(MapStyle),
    RestoreViewport(Viewport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: ReconcilerState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: &ReconcilerState) -> Self {
        Self {
            next: state.clone(),
            effects: Vec::new(),
        }
    }
}

/// Desired state, as of the event being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerInputs {
    pub surface_loaded: bool,
    pub filters: Vec<MetricKind>,
    pub date: Option<String>,
    pub scope: GeographicScope,
    /// Camera at the time of the event.
    pub viewport: Viewport,
    /// Id of the most recently started pass; 0 before the first.
    pub latest_pass: u64,
}

impl Default for ReconcilerInputs {
    fn default() -> Self {
        Self {
            surface_loaded: false,
            filters: Vec::new(),
            date: None,
            scope: GeographicScope::national(),
            viewport: Viewport::default(),
            latest_pass: 0,
        }
    }
}

impl ReconcilerInputs {
    /// No pass runs before the surface is loaded and a date is known.
    pub fn is_ready(&self) -> bool {
        self.surface_loaded && self.date.is_some()
    }

    fn next_pass(&self) -> u64 {
        self.latest_pass + 1
    }
}

pub fn transition(state: &ReconcilerState, inputs: &ReconcilerInputs, event: &ReconcilerEvent) -> Transition {
    use ReconcilerEvent as E;
    use ReconcilerState as S;

    match (state, event) {
        (S::RecoveringFromStyleSwap { viewport, .. }, E::StyleLoaded) => {
            let mut effects = vec![Effect::RestoreViewport(*viewport)];
            if !inputs.is_ready() {
                return Transition { next: S::Idle, effects };
            }
            let pass = inputs.next_pass();
            effects.push(Effect::RunPass { pass, recovering: true });
            Transition {
                next: S::Reconciling { pass },
                effects,
            }
        }
        // Keep the camera captured before the first swap.
        (S::RecoveringFromStyleSwap { viewport, .. }, E::StyleSwapRequested(style)) => Transition {
            next: S::RecoveringFromStyleSwap {
                style: *style,
                viewport: *viewport,
            },
            effects: vec![Effect::ApplyStyle(*style)],
        },
        // The recovery pass reads whatever inputs are current once the style lands.
        (S::RecoveringFromStyleSwap { .. }, _) => Transition::stay(state),

        (_, E::StyleSwapRequested(style)) => Transition {
            next: S::RecoveringFromStyleSwap {
                style: *style,
                viewport: inputs.viewport,
            },
            effects: vec![Effect::ApplyStyle(*style)],
        },

        (_, E::SurfaceLoaded | E::FiltersChanged(_) | E::DateChanged(_) | E::ScopeChanged(_)) => {
            if !inputs.is_ready() {
                return Transition::stay(state);
            }
            let pass = inputs.next_pass();
            Transition {
                next: S::Reconciling { pass },
                effects: vec![Effect::RunPass { pass, recovering: false }],
            }
        }

        (S::Reconciling { pass: current }, E::PassCompleted { pass, .. }) if pass == current => Transition {
            next: S::Idle,
            effects: Vec::new(),
        },

        (_, E::PassCompleted { .. } | E::StyleLoaded | E::LegendSelected(_)) => Transition::stay(state),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerStatus {
    Idle,
    Loading,
    Ready,
    Error { message: String, retryable: bool },
    /// Initialization failed; nothing retries automatically.
    Fatal { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerError {
    InvalidInput(String),
    Init(FetchError),
    Fetch(FetchError),
    Surface(SurfaceError),
}

impl std::fmt::Display for ReconcilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcilerError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            ReconcilerError::Init(err) => write!(f, "failed to load data: {err}"),
            ReconcilerError::Fetch(err) => write!(f, "fetch failed: {err}"),
            ReconcilerError::Surface(err) => write!(f, "surface error: {err}"),
        }
    }
}

impl std::error::Error for ReconcilerError {}

impl From<FetchError> for ReconcilerError {
    fn from(err: FetchError) -> Self {
        ReconcilerError::Fetch(err)
    }
}

impl From<SurfaceError> for ReconcilerError {
    fn from(err: SurfaceError) -> Self {
        ReconcilerError::Surface(err)
    }
}

/// Drives [`transition`] against a live surface.
pub struct LayerReconciler<S: MapSurface> {
    surface: Arc<Mutex<S>>,
    service: Arc<GeoDataService>,
    state: ReconcilerState,
    inputs: ReconcilerInputs,
    active: ActiveLayerSet,
    legend: Option<MetricKind>,
    status: ReconcilerStatus,
}

impl<S: MapSurface> LayerReconciler<S> {
    pub fn new(surface: Arc<Mutex<S>>, service: Arc<GeoDataService>) -> Self {
        Self {
            surface,
            service,
            state: ReconcilerState::Idle,
            inputs: ReconcilerInputs::default(),
            active: ActiveLayerSet::default(),
            legend: None,
            status: ReconcilerStatus::Idle,
        }
    }

    pub fn surface(&self) -> &Arc<Mutex<S>> {
        &self.surface
    }

    pub fn service(&self) -> &Arc<GeoDataService> {
        &self.service
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    pub fn inputs(&self) -> &ReconcilerInputs {
        &self.inputs
    }

    pub fn active_layers(&self) -> &ActiveLayerSet {
        &self.active
    }

    /// Metric whose legend is shown.
    pub fn legend_filter(&self) -> Option<MetricKind> {
        self.legend
    }

    pub fn status(&self) -> &ReconcilerStatus {
        &self.status
    }

    /// Loads the latest dataset date unless one is already set.
    pub async fn initialize(&mut self) -> Result<(), ReconcilerError> {
        if self.inputs.date.is_some() {
            return Ok(());
        }
        match self.service.get_latest_date().await {
            Ok(date) => {
                info!("latest dataset date {date}");
                self.handle(ReconcilerEvent::DateChanged(date)).await
            }
            Err(err) => {
                error!("initialization failed: {err}");
                self.status = ReconcilerStatus::Fatal {
                    message: err.to_string(),
                };
                Err(ReconcilerError::Init(err))
            }
        }
    }

    /// Consumes events until every sender is dropped. Surface signals are
    /// pumped after each event.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<ReconcilerEvent>) {
        self.pump_surface_events().await;
        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle(event).await {
                warn!("event rejected: {err}");
            }
            self.pump_surface_events().await;
        }
        debug!("reconciler event stream closed");
    }

    /// Feeds pending surface signals through [`Self::handle`] until none remain.
    pub async fn pump_surface_events(&mut self) {
        loop {
            let pending = self.surface.lock().take_events();
            if pending.is_empty() {
                return;
            }
            for event in pending {
                if let Err(err) = self.handle(event.into()).await {
                    warn!("surface event rejected: {err}");
                }
            }
        }
    }

    /// Processes one event and every follow-up event it causes.
    pub async fn handle(&mut self, event: ReconcilerEvent) -> Result<(), ReconcilerError> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            if let Err(err) = self.absorb(&event) {
                warn!("{err}");
                self.status = ReconcilerStatus::Error {
                    message: err.to_string(),
                    retryable: true,
                };
                return Err(err);
            }
            self.inputs.viewport = self.surface.lock().viewport();

            let Transition { next, effects } = transition(&self.state, &self.inputs, &event);
            trace!(?event, from = ?self.state, to = ?next, "transition");
            self.state = next;

            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
        Ok(())
    }

    /// Records the event's inputs, rejecting malformed ones.
    fn absorb(&mut self, event: &ReconcilerEvent) -> Result<(), ReconcilerError> {
        match event {
            ReconcilerEvent::SurfaceLoaded => self.inputs.surface_loaded = true,
            ReconcilerEvent::FiltersChanged(filters) => {
                let mut unique = Vec::with_capacity(filters.len());
                for f in filters {
                    if !unique.contains(f) {
                        unique.push(*f);
                    }
                }
                self.inputs.filters = unique;
            }
            ReconcilerEvent::DateChanged(date) => {
                if parse_iso_date(date).is_none() {
                    return Err(ReconcilerError::InvalidInput(format!("malformed date {date:?}")));
                }
                self.inputs.date = Some(date.clone());
            }
            ReconcilerEvent::ScopeChanged(scope) => self.inputs.scope = scope.clone(),
            ReconcilerEvent::LegendSelected(metric) => {
                if !self.active.contains(*metric) {
                    return Err(ReconcilerError::InvalidInput(format!("{metric} is not an active layer")));
                }
                self.legend = Some(*metric);
            }
            ReconcilerEvent::StyleSwapRequested(_)
            | ReconcilerEvent::StyleLoaded
            | ReconcilerEvent::PassCompleted { .. } => {}
        }
        Ok(())
    }

    async fn execute(&mut self, effect: Effect) -> Option<ReconcilerEvent> {
        match effect {
            Effect::RunPass { pass, recovering } => {
                self.inputs.latest_pass = pass;
                self.status = ReconcilerStatus::Loading;
                let applied = self.run_pass(pass, recovering).await;
                Some(ReconcilerEvent::PassCompleted { pass, applied })
            }
            Effect::ApplyStyle(style) => {
                info!("switching base style to {style}");
                self.active.clear();
                self.surface.lock().set_style(style);
                None
            }
            Effect::RestoreViewport(viewport) => {
                self.surface.lock().set_viewport(viewport);
                None
            }
        }
    }

    async fn run_pass(&mut self, pass: u64, recovering: bool) -> Vec<MetricKind> {
        let Some(date) = self.inputs.date.clone() else {
            return Vec::new();
        };
        let desired = self.inputs.filters.clone();
        let scope = self.inputs.scope.clone();
        debug!(pass, recovering, "reconciling {} filters at {} scope", desired.len(), scope.kind);

        let stale: Vec<MetricKind> = self.active.ids().filter(|m| !desired.contains(m)).collect();
        for metric in stale {
            self.detach(metric);
        }

        let mut applied = ActiveLayerSet::default();
        for metric in &desired {
            let query = FeatureQuery::for_scope(*metric, date.as_str(), &scope);
            match self.attach(&query, recovering).await {
                Ok(true) => applied.insert(*metric, query.cache_key()),
                Ok(false) => self.detach(*metric),
                Err(ReconcilerError::Fetch(err)) => {
                    warn!("no data for {metric}: {err}");
                    self.detach(*metric);
                }
                Err(err) => {
                    error!("error adding layer for {metric}: {err}");
                    self.detach(*metric);
                }
            }
        }

        let ids: Vec<MetricKind> = applied.ids().collect();
        self.active = applied;
        if self.active.is_empty() {
            self.legend = None;
        } else if self.legend.is_none() {
            self.legend = self.active.first();
        }
        self.status = ReconcilerStatus::Ready;
        ids
    }

    /// Adds or refreshes the layers for one metric. `Ok(false)` when there is
    /// nothing to show.
    async fn attach(&mut self, query: &FeatureQuery, recovering: bool) -> Result<bool, ReconcilerError> {
        let metric = query.metric;
        let fill = fill_layer_id(metric);
        let line = line_layer_id(metric);
        let key = query.cache_key();

        if !recovering && self.active.key_for(metric) == Some(&key) && self.surface.lock().has_layer(fill) {
            trace!("keeping {fill}");
            return Ok(true);
        }

        let data = self.service.fetch_filter_geojson(query).await?;
        if data.is_empty() {
            warn!("no data available for {metric}");
            return Ok(false);
        }

        let source = source_id(metric);
        let color = get_color_scale_expression(metric, query.scope).to_expression();
        let width = json!(line_width(query.scope));

        let mut surface = self.surface.lock();
        if surface.has_source(&source) {
            surface.set_source_data(&source, data)?;
        } else {
            surface.add_source(&source, data)?;
        }

        if surface.has_layer(fill) {
            surface.set_paint_property(fill, "fill-color", color)?;
        } else {
            surface.add_layer(fill_layer(metric, &source, color))?;
        }
        if surface.has_layer(&line) {
            surface.set_paint_property(&line, "line-width", width)?;
        } else {
            surface.add_layer(
                LayerSpec::new(line, source, LayerKind::Line)
                    .with_paint("line-color", json!(OUTLINE_COLOR))
                    .with_paint("line-width", width),
            )?;
        }

        if surface.has_layer(fill) {
            Ok(true)
        } else {
            warn!("failed to add layer {fill}");
            Ok(false)
        }
    }

    /// Removes a metric's line layer, fill layer, and source, in that order,
    /// skipping whatever is already gone.
    fn detach(&mut self, metric: MetricKind) {
        let mut surface = self.surface.lock();
        let line = line_layer_id(metric);
        let fill = fill_layer_id(metric);
        let source = source_id(metric);

        let mut result = Ok(());
        if surface.has_layer(&line) {
            result = result.and(surface.remove_layer(&line));
        }
        if surface.has_layer(fill) {
            result = result.and(surface.remove_layer(fill));
        }
        if surface.has_source(&source) {
            result = result.and(surface.remove_source(&source));
        }
        if let Err(err) = result {
            warn!("error removing layers for {metric}: {err}");
        }
    }
}

fn fill_layer(metric: MetricKind, source: &str, color: Value) -> LayerSpec {
    LayerSpec::new(fill_layer_id(metric), source, LayerKind::Fill)
        .with_paint("fill-color", color)
        .with_paint("fill-opacity", json!(FILL_OPACITY))
        .with_paint("fill-outline-color", json!(OUTLINE_COLOR))
}

impl<S: MapSurface> std::fmt::Debug for LayerReconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerReconciler")
            .field("state", &self.state)
            .field("active", &self.active)
            .field("legend", &self.legend)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::HeadlessSurface;
    use foundation::time::ManualClock;
    use pretty_assertions::assert_eq;
    use streaming::cache::{DEFAULT_TTL_MS, GeoDataCache};
    use streaming::protocol::{Feature, FeatureCollection, FeatureProperties, Geometry};
    use streaming::source::InMemorySource;

    const A: MetricKind = MetricKind::MedianPrice;
    const B: MetricKind = MetricKind::Inventory;
    const C: MetricKind = MetricKind::DaysOnMarket;

    fn collection() -> FeatureCollection {
        let region = |id: &str, x: f64, value: f64| Feature {
            id: Some(id.to_string()),
            properties: FeatureProperties {
                id: id.to_string(),
                name: format!("Region {id}"),
                region_type: "state".to_string(),
                value: Some(value),
                ..Default::default()
            },
            geometry: Geometry::Polygon {
                coordinates: vec![vec![[x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0], [x, 0.0]]],
            },
        };
        FeatureCollection {
            features: vec![region("R1", 0.0, 250_000.0), region("R2", 1.0, 900_000.0)],
        }
    }

    fn fixture() -> (Arc<InMemorySource>, LayerReconciler<HeadlessSurface>) {
        let source = Arc::new(InMemorySource::new());
        for metric in [A, B, C] {
            source.insert(metric, collection());
        }
        source.set_dates(vec!["2024-04-01".into(), "2024-05-01".into()]);
        let cache = Arc::new(GeoDataCache::new(Arc::new(ManualClock::new(0)), DEFAULT_TTL_MS));
        let service = Arc::new(GeoDataService::new(source.clone(), cache));
        let surface = Arc::new(Mutex::new(HeadlessSurface::new()));
        (source, LayerReconciler::new(surface, service))
    }

    async fn make_ready(r: &mut LayerReconciler<HeadlessSurface>) {
        r.surface().lock().finish_loading();
        r.pump_surface_events().await;
        r.handle(ReconcilerEvent::DateChanged("2024-05-01".into())).await.unwrap();
    }

    fn active(r: &LayerReconciler<HeadlessSurface>) -> Vec<MetricKind> {
        r.active_layers().ids().collect()
    }

    #[tokio::test]
    async fn nothing_renders_before_load_and_date() {
        let (source, mut r) = fixture();
        r.handle(ReconcilerEvent::FiltersChanged(vec![A])).await.unwrap();
        assert_eq!(r.inputs().latest_pass, 0);
        assert_eq!(source.fetch_count(), 0);

        r.surface().lock().finish_loading();
        r.pump_surface_events().await;
        assert_eq!(source.fetch_count(), 0);

        r.handle(ReconcilerEvent::DateChanged("2024-05-01".into())).await.unwrap();
        assert_eq!(active(&r), vec![A]);
        assert_eq!(r.state(), &ReconcilerState::Idle);
        assert_eq!(r.status(), &ReconcilerStatus::Ready);
    }

    #[tokio::test]
    async fn converges_on_the_latest_filters() {
        let (_source, mut r) = fixture();
        make_ready(&mut r).await;

        r.handle(ReconcilerEvent::FiltersChanged(vec![A, B])).await.unwrap();
        assert_eq!(active(&r), vec![A, B]);
        assert_eq!(r.legend_filter(), Some(A));

        r.handle(ReconcilerEvent::FiltersChanged(vec![B, C])).await.unwrap();
        r.handle(ReconcilerEvent::FiltersChanged(vec![C])).await.unwrap();
        assert_eq!(active(&r), vec![C]);

        let surface = r.surface().lock();
        assert_eq!(surface.layer_ids(), vec!["days_on_market", "days_on_market-line"]);
        assert_eq!(surface.source_ids(), vec!["source-days_on_market"]);
    }

    #[tokio::test]
    async fn clearing_filters_clears_the_legend() {
        let (_source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![B])).await.unwrap();
        assert_eq!(r.legend_filter(), Some(B));

        r.handle(ReconcilerEvent::FiltersChanged(vec![])).await.unwrap();
        assert!(r.active_layers().is_empty());
        assert_eq!(r.legend_filter(), None);
        assert!(r.surface().lock().layer_ids().is_empty());
    }

    #[tokio::test]
    async fn unchanged_layers_are_kept_without_refetch() {
        let (source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![A])).await.unwrap();
        r.handle(ReconcilerEvent::FiltersChanged(vec![A, A])).await.unwrap();
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(r.inputs().filters, vec![A]);
    }

    #[tokio::test]
    async fn date_change_swaps_source_data_in_place() {
        let (source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![A])).await.unwrap();
        r.handle(ReconcilerEvent::DateChanged("2024-04-01".into())).await.unwrap();

        assert_eq!(source.fetch_count(), 2);
        let surface = r.surface().lock();
        assert_eq!(surface.layer_ids(), vec!["median_price", "median_price-line"]);
        let data = surface.source_data("source-median_price").expect("source");
        assert_eq!(data.features[0].properties.date.as_deref(), Some("2024-04-01"));
    }

    #[tokio::test]
    async fn scope_change_restyles_existing_layers() {
        let (_source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![B])).await.unwrap();
        {
            let surface = r.surface().lock();
            let fill = surface.layer("inventory").expect("fill");
            assert_eq!(fill.paint("fill-opacity"), Some(&json!(0.7)));
            assert_eq!(fill.paint("fill-outline-color"), Some(&json!("rgba(0, 0, 0, 0.5)")));
            assert_eq!(surface.layer("inventory-line").and_then(|l| l.paint("line-width")), Some(&json!(0.5)));
        }

        let zip = GeographicScope {
            kind: ScopeKind::Zipcode,
            id: "90210".into(),
            name: "90210".into(),
            bounds: None,
        };
        r.handle(ReconcilerEvent::ScopeChanged(zip)).await.unwrap();

        let surface = r.surface().lock();
        assert_eq!(surface.layer("inventory-line").and_then(|l| l.paint("line-width")), Some(&json!(2.0)));
        let expected = get_color_scale_expression(B, ScopeKind::Zipcode).to_expression();
        assert_eq!(surface.layer("inventory").and_then(|l| l.paint("fill-color")), Some(&expected));
    }

    #[tokio::test]
    async fn one_failing_filter_does_not_block_the_rest() {
        let (source, mut r) = fixture();
        source.fail(B, FetchError::Status { status: 500, message: "boom".into() });
        make_ready(&mut r).await;

        r.handle(ReconcilerEvent::FiltersChanged(vec![B, A, C])).await.unwrap();
        assert_eq!(active(&r), vec![A, C]);
        assert!(!r.surface().lock().has_layer("inventory"));
    }

    #[tokio::test]
    async fn rejected_layer_leaves_no_orphan_source() {
        let (_source, mut r) = fixture();
        r.surface().lock().reject_layer("median_price");
        make_ready(&mut r).await;

        r.handle(ReconcilerEvent::FiltersChanged(vec![A, C])).await.unwrap();
        assert_eq!(active(&r), vec![C]);
        assert_eq!(r.surface().lock().source_ids(), vec!["source-days_on_market"]);
    }

    #[tokio::test]
    async fn empty_collections_are_skipped() {
        let (source, mut r) = fixture();
        source.insert(MetricKind::Condo, FeatureCollection::empty());
        make_ready(&mut r).await;

        r.handle(ReconcilerEvent::FiltersChanged(vec![MetricKind::Condo, A])).await.unwrap();
        assert_eq!(active(&r), vec![A]);
        assert!(!r.surface().lock().has_source("source-condo"));
    }

    #[tokio::test]
    async fn style_swap_re_adds_layers_after_restoring_the_camera() {
        let (source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![A, B])).await.unwrap();
        let camera = Viewport::new([-118.24, 34.05], 9.0);
        r.surface().lock().set_viewport(camera);

        r.handle(ReconcilerEvent::StyleSwapRequested(MapStyle::Satellite)).await.unwrap();
        assert!(matches!(r.state(), ReconcilerState::RecoveringFromStyleSwap { .. }));
        assert!(r.active_layers().is_empty());
        assert!(r.surface().lock().layer_ids().is_empty());

        r.pump_surface_events().await;
        assert_eq!(r.state(), &ReconcilerState::Idle);
        assert_eq!(active(&r), vec![A, B]);
        let surface = r.surface().lock();
        assert_eq!(surface.viewport(), camera);
        assert_eq!(surface.style(), MapStyle::Satellite);
        assert_eq!(
            surface.layer_ids(),
            vec!["median_price", "median_price-line", "inventory", "inventory-line"]
        );
        // Served from cache.
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn filter_changes_during_a_swap_apply_on_recovery() {
        let (_source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![A])).await.unwrap();
        r.handle(ReconcilerEvent::StyleSwapRequested(MapStyle::Terrain)).await.unwrap();
        r.handle(ReconcilerEvent::FiltersChanged(vec![C])).await.unwrap();
        assert!(r.surface().lock().layer_ids().is_empty());

        r.pump_surface_events().await;
        assert_eq!(active(&r), vec![C]);
    }

    #[tokio::test]
    async fn malformed_date_is_reported_as_retryable() {
        let (_source, mut r) = fixture();
        for date in ["05/01/2024", "2024-02-31", "2023-02-29"] {
            let err = r.handle(ReconcilerEvent::DateChanged(date.into())).await.unwrap_err();
            assert!(matches!(err, ReconcilerError::InvalidInput(_)), "{date}");
            assert!(matches!(r.status(), ReconcilerStatus::Error { retryable: true, .. }));
            assert_eq!(r.inputs().date, None);
        }
    }

    #[tokio::test]
    async fn legend_selection_is_limited_to_active_layers() {
        let (_source, mut r) = fixture();
        make_ready(&mut r).await;
        r.handle(ReconcilerEvent::FiltersChanged(vec![A, B])).await.unwrap();

        r.handle(ReconcilerEvent::LegendSelected(B)).await.unwrap();
        assert_eq!(r.legend_filter(), Some(B));
        assert!(r.handle(ReconcilerEvent::LegendSelected(C)).await.is_err());
        assert_eq!(r.legend_filter(), Some(B));
    }

    #[tokio::test]
    async fn initialize_picks_the_latest_date() {
        let (_source, mut r) = fixture();
        r.initialize().await.unwrap();
        assert_eq!(r.inputs().date.as_deref(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn initialize_without_dates_is_fatal() {
        let (source, mut r) = fixture();
        source.set_dates(Vec::new());
        assert!(matches!(r.initialize().await, Err(ReconcilerError::Init(_))));
        assert!(matches!(r.status(), ReconcilerStatus::Fatal { .. }));
    }

    #[tokio::test]
    async fn run_drains_the_event_channel() {
        let (_source, mut r) = fixture();
        r.surface().lock().finish_loading();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ReconcilerEvent::DateChanged("2024-05-01".into())).unwrap();
        tx.send(ReconcilerEvent::FiltersChanged(vec![A, B])).unwrap();
        tx.send(ReconcilerEvent::StyleSwapRequested(MapStyle::Terrain)).unwrap();
        tx.send(ReconcilerEvent::FiltersChanged(vec![B])).unwrap();
        drop(tx);

        r.run(rx).await;
        assert_eq!(active(&r), vec![B]);
        assert_eq!(r.surface().lock().style(), MapStyle::Terrain);
    }

    #[test]
    fn superseded_pass_completion_is_ignored() {
        let inputs = ReconcilerInputs {
            surface_loaded: true,
            date: Some("2024-05-01".into()),
            latest_pass: 4,
            ..Default::default()
        };
        let state = ReconcilerState::Reconciling { pass: 4 };
        let stale = ReconcilerEvent::PassCompleted { pass: 3, applied: vec![A] };
        assert_eq!(transition(&state, &inputs, &stale), Transition::stay(&state));

        let current = ReconcilerEvent::PassCompleted { pass: 4, applied: vec![A] };
        assert_eq!(transition(&state, &inputs, &current).next, ReconcilerState::Idle);
    }

    #[test]
    fn input_change_starts_the_next_pass() {
        let inputs = ReconcilerInputs {
            surface_loaded: true,
            date: Some("2024-05-01".into()),
            latest_pass: 7,
            ..Default::default()
        };
        let t = transition(&ReconcilerState::Idle, &inputs, &ReconcilerEvent::FiltersChanged(vec![A]));
        assert_eq!(t.next, ReconcilerState::Reconciling { pass: 8 });
        assert_eq!(t.effects, vec![Effect::RunPass { pass: 8, recovering: false }]);
    }

    #[test]
    fn repeated_swaps_keep_the_first_camera() {
        let first = Viewport::new([1.0, 2.0], 5.0);
        let inputs = ReconcilerInputs {
            viewport: Viewport::new([9.0, 9.0], 1.0),
            ..Default::default()
        };
        let state = ReconcilerState::RecoveringFromStyleSwap {
            style: MapStyle::Terrain,
            viewport: first,
        };
        let t = transition(&state, &inputs, &ReconcilerEvent::StyleSwapRequested(MapStyle::Satellite));
        assert_eq!(
            t.next,
            ReconcilerState::RecoveringFromStyleSwap {
                style: MapStyle::Satellite,
                viewport: first
            }
        );

        // Not ready yet: the camera comes back but no pass runs.
        let t = transition(&t.next, &inputs, &ReconcilerEvent::StyleLoaded);
        assert_eq!(t.next, ReconcilerState::Idle);
        assert_eq!(t.effects, vec![Effect::RestoreViewport(first)]);
    }
}
