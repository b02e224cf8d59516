//! Data source abstraction for market metrics.
//!
//! The service talks to a [`GeoDataSource`]; [`HttpMarketDataSource`] speaks to
//! the `/market-data` endpoints and [`InMemorySource`] serves fixed
//! collections (tests, demos, offline runs).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use catalog::MetricKind;
use foundation::scope::ScopeKind;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::protocol::{ApiErrorBody, FeatureCollection, RegionMetrics};
use crate::request::FeatureQuery;

/// Error type for data source operations. `Clone` so a single failure can be
/// handed to every caller sharing an in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Transport(String),
    Status { status: u16, message: String },
    Decode(String),
    NoData(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Status { status, message } => write!(f, "API error {status}: {message}"),
            FetchError::Decode(msg) => write!(f, "invalid response body: {msg}"),
            FetchError::NoData(what) => write!(f, "no data: {what}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Source of metric-bearing boundary features.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait GeoDataSource: Send + Sync {
    fn fetch_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureCollection, FetchError>>;

    /// Distinct dataset dates, in any order.
    fn fetch_dates(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>>;

    fn fetch_region_metrics<'a>(
        &'a self,
        region_id: &'a str,
        metric: MetricKind,
        date: &'a str,
    ) -> BoxFuture<'a, Result<RegionMetrics, FetchError>>;
}

/// Client for the market-data HTTP API.
pub struct HttpMarketDataSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMarketDataSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query parameters for a feature request. The national scope is implied
    /// by omitting `geoScope`.
    pub fn feature_params(query: &FeatureQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("filter", query.metric.id().to_string()),
            ("date", query.date.clone()),
        ];
        if query.scope != ScopeKind::Country {
            params.push(("geoScope", query.scope.as_str().to_string()));
        }
        if let Some(id) = &query.scope_id {
            params.push(("geoId", id.clone()));
        }
        params
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ApiErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
            };
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl GeoDataSource for HttpMarketDataSource {
    fn fetch_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureCollection, FetchError>> {
        Box::pin(async move {
            let params = Self::feature_params(query);
            self.get_json("/market-data", &params).await
        })
    }

    fn fetch_dates(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        Box::pin(async move { self.get_json("/market-data/dates", &[]).await })
    }

    fn fetch_region_metrics<'a>(
        &'a self,
        region_id: &'a str,
        metric: MetricKind,
        date: &'a str,
    ) -> BoxFuture<'a, Result<RegionMetrics, FetchError>> {
        Box::pin(async move {
            let params = [
                ("filter", metric.id().to_string()),
                ("date", date.to_string()),
                ("regionId", region_id.to_string()),
            ];
            self.get_json("/market-data", &params).await
        })
    }
}

/// Latch that holds [`InMemorySource`] fetches until opened.
#[derive(Debug)]
pub struct FetchGate {
    open: watch::Sender<bool>,
}

impl Default for FetchGate {
    fn default() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }
}

impl FetchGate {
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Fixed, in-process source. Collections are keyed by metric; every fetch is
/// counted so callers can assert on network behaviour.
#[derive(Default)]
pub struct InMemorySource {
    collections: Mutex<HashMap<MetricKind, FeatureCollection>>,
    failing: Mutex<HashMap<MetricKind, FetchError>>,
    dates: Mutex<Vec<String>>,
    fetches: AtomicU64,
    gate: Mutex<Option<Arc<FetchGate>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metric: MetricKind, collection: FeatureCollection) {
        self.collections.lock().insert(metric, collection);
    }

    pub fn fail(&self, metric: MetricKind, error: FetchError) {
        self.failing.lock().insert(metric, error);
    }

    pub fn set_dates(&self, dates: Vec<String>) {
        *self.dates.lock() = dates;
    }

    /// Holds every subsequent feature fetch until the returned gate is opened.
    pub fn hold_fetches(&self) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate::default());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Number of feature fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl GeoDataSource for InMemorySource {
    fn fetch_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureCollection, FetchError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.wait().await;
            }
            if let Some(err) = self.failing.lock().get(&query.metric) {
                return Err(err.clone());
            }
            let mut fc = self
                .collections
                .lock()
                .get(&query.metric)
                .cloned()
                .unwrap_or_default();
            for f in &mut fc.features {
                f.properties.filter = Some(query.metric);
                f.properties.date = Some(query.date.clone());
            }
            Ok(fc)
        })
    }

    fn fetch_dates(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        Box::pin(async move { Ok(self.dates.lock().clone()) })
    }

    fn fetch_region_metrics<'a>(
        &'a self,
        region_id: &'a str,
        metric: MetricKind,
        date: &'a str,
    ) -> BoxFuture<'a, Result<RegionMetrics, FetchError>> {
        Box::pin(async move {
            let collections = self.collections.lock();
            let feature = collections
                .get(&metric)
                .and_then(|fc| fc.features.iter().find(|f| f.properties.id == region_id))
                .ok_or_else(|| FetchError::Status {
                    status: 404,
                    message: "Region data not found".to_string(),
                })?;
            let mut metrics = std::collections::BTreeMap::new();
            if let Some(v) = feature.properties.value {
                metrics.insert(metric, v);
            }
            Ok(RegionMetrics {
                id: feature.properties.id.clone(),
                name: feature.properties.name.clone(),
                timestamp: date.to_string(),
                metrics,
            })
        })
    }
}
