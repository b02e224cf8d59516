use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use catalog::MetricKind;
use foundation::scope::ScopeKind;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, try_join_all};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::{DEFAULT_TTL_MS, GeoDataCache};
use crate::preload::{FetchResult, PreloadState, PreloadStatus, SharedFetch};
use crate::protocol::FeatureCollection;
use crate::request::{CacheKey, FeatureQuery};
use crate::source::{FetchError, GeoDataSource, HttpMarketDataSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub ttl_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

/// Cache-first access to metric features and dataset dates.
///
/// Lookups go cache → in-flight fetch for the same key → new fetch. A fetch
/// result is written to the cache once, by the fetch itself, so every caller
/// sharing it sees the same `Arc`. Failures are never cached.
pub struct GeoDataService {
    source: Arc<dyn GeoDataSource>,
    cache: Arc<GeoDataCache>,
    preload: Mutex<HashMap<CacheKey, PreloadState>>,
    next_generation: AtomicU64,
}

impl GeoDataService {
    pub fn new(source: Arc<dyn GeoDataSource>, cache: Arc<GeoDataCache>) -> Self {
        Self {
            source,
            cache,
            preload: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// HTTP-backed service on the wall clock.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let source = Arc::new(HttpMarketDataSource::new(config.base_url.as_str()));
        let cache = Arc::new(GeoDataCache::with_system_clock(config.ttl_ms));
        Self::new(source, cache)
    }

    pub fn cache(&self) -> &Arc<GeoDataCache> {
        &self.cache
    }

    pub fn preload_status(&self, key: &CacheKey) -> Option<PreloadStatus> {
        self.preload.lock().get(key).map(PreloadState::status)
    }

    /// Features for one metric layer. Fetch failures degrade to an empty
    /// collection; use [`Self::fetch_filter_geojson`] to tell them apart.
    pub async fn get_filter_geojson(
        &self,
        metric: MetricKind,
        date: &str,
        scope: ScopeKind,
        scope_id: Option<&str>,
    ) -> Arc<FeatureCollection> {
        let query = FeatureQuery::new(metric, date, scope, scope_id);
        match self.fetch_filter_geojson(&query).await {
            Ok(fc) => fc,
            Err(err) => {
                warn!("error fetching features for {}: {err}", query.cache_key());
                Arc::new(FeatureCollection::empty())
            }
        }
    }

    pub async fn fetch_filter_geojson(&self, query: &FeatureQuery) -> FetchResult {
        let key = query.cache_key();
        if let Some(hit) = self.cache.features(&key) {
            trace!("cache hit {key}");
            return Ok(hit);
        }

        let (generation, fetch) = self.join_or_start(&key, query);
        let result = fetch.await;
        self.settle(&key, generation, &result);
        result
    }

    /// Returns the in-flight fetch for `key`, starting one if there is none.
    fn join_or_start(&self, key: &CacheKey, query: &FeatureQuery) -> (u64, SharedFetch) {
        let mut table = self.preload.lock();
        // A fetch may have landed between the cache miss and taking the lock.
        if let Some(hit) = self.cache.features(key) {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let ready: BoxFuture<'static, FetchResult> = Box::pin(futures_util::future::ready(Ok(hit)));
            return (generation, ready.shared());
        }
        if let Some(PreloadState::Loading { generation, fetch }) = table.get(key) {
            debug!("joining in-flight fetch {key}");
            return (*generation, fetch.clone());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let fetch = self.start_fetch(key.clone(), query.clone());
        table.insert(
            key.clone(),
            PreloadState::Loading {
                generation,
                fetch: fetch.clone(),
            },
        );
        (generation, fetch)
    }

    fn start_fetch(&self, key: CacheKey, query: FeatureQuery) -> SharedFetch {
        debug!("fetching {key}");
        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        let fut: BoxFuture<'static, FetchResult> = Box::pin(async move {
            let fc = Arc::new(source.fetch_features(&query).await?);
            cache.insert_features(key, Arc::clone(&fc));
            Ok(fc)
        });
        fut.shared()
    }

    fn settle(&self, key: &CacheKey, generation: u64, result: &FetchResult) {
        let mut table = self.preload.lock();
        let owns_slot = matches!(
            table.get(key),
            Some(PreloadState::Loading { generation: g, .. }) if *g == generation
        );
        if !owns_slot {
            return;
        }
        let next = match result {
            Ok(_) => PreloadState::Loaded,
            Err(err) => PreloadState::Error(err.to_string()),
        };
        table.insert(key.clone(), next);
    }

    /// Distinct dataset dates, newest first.
    pub async fn get_available_dates(&self) -> Result<Arc<Vec<String>>, FetchError> {
        if let Some(dates) = self.cache.dates() {
            return Ok(dates);
        }

        let mut dates = self.source.fetch_dates().await?;
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        let dates = Arc::new(dates);
        self.cache.set_dates(Arc::clone(&dates));
        if let Some(latest) = dates.first() {
            self.cache.set_latest_date(latest.clone());
        }
        Ok(dates)
    }

    pub async fn get_latest_date(&self) -> Result<String, FetchError> {
        if let Some(latest) = self.cache.latest_date() {
            return Ok(latest);
        }
        let dates = self.get_available_dates().await?;
        dates
            .first()
            .cloned()
            .ok_or_else(|| FetchError::NoData("dataset has no dates".to_string()))
    }

    /// Value of one metric for one region, or `None` if it cannot be fetched.
    pub async fn get_metric_value(
        &self,
        region_id: &str,
        metric: MetricKind,
        date: &str,
    ) -> Option<f64> {
        match self.source.fetch_region_metrics(region_id, metric, date).await {
            Ok(region) => region.metrics.get(&metric).copied(),
            Err(err) => {
                warn!("error fetching {metric} for region {region_id}: {err}");
                None
            }
        }
    }

    /// Warms the cache for every (metric, date) combination concurrently.
    /// Resolves once all fetches finish, or with the first failure.
    pub async fn preload_data(
        &self,
        metrics: &[MetricKind],
        dates: &[String],
        scope: ScopeKind,
        scope_id: Option<&str>,
    ) -> Result<(), FetchError> {
        let queries: Vec<FeatureQuery> = metrics
            .iter()
            .flat_map(|m| dates.iter().map(move |d| FeatureQuery::new(*m, d.as_str(), scope, scope_id)))
            .collect();

        {
            let mut table = self.preload.lock();
            for q in &queries {
                table.entry(q.cache_key()).or_insert(PreloadState::Pending);
            }
        }

        debug!("preloading {} combinations", queries.len());
        try_join_all(queries.iter().map(|q| self.fetch_filter_geojson(q))).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GeoDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDataService")
            .field("cache", &self.cache)
            .field("tracked_keys", &self.preload.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GeoDataService, ServiceConfig};
    use crate::cache::{DEFAULT_TTL_MS, GeoDataCache};
    use crate::preload::PreloadStatus;
    use crate::protocol::{Feature, FeatureCollection, FeatureProperties, Geometry};
    use crate::request::FeatureQuery;
    use crate::source::{FetchError, InMemorySource};
    use catalog::MetricKind;
    use foundation::scope::ScopeKind;
    use foundation::time::ManualClock;
    use pretty_assertions::assert_eq;

    fn square(id: &str, value: f64) -> Feature {
        Feature {
            id: Some(id.to_string()),
            properties: FeatureProperties {
                id: id.to_string(),
                name: format!("Region {id}"),
                region_type: "state".to_string(),
                value: Some(value),
                ..Default::default()
            },
            geometry: Geometry::Polygon {
                coordinates: vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
            },
        }
    }

    fn service() -> (Arc<ManualClock>, Arc<InMemorySource>, GeoDataService) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let source = Arc::new(InMemorySource::new());
        source.insert(
            MetricKind::MedianPrice,
            FeatureCollection {
                features: vec![square("CA", 812_000.0), square("TX", 340_000.0)],
            },
        );
        let cache = Arc::new(GeoDataCache::new(clock.clone(), DEFAULT_TTL_MS));
        let svc = GeoDataService::new(source.clone(), cache);
        (clock, source, svc)
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let (_clock, source, svc) = service();
        let a = svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::Country, Some("US")).await;
        let b = svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::Country, Some("US")).await;
        assert_eq!(source.fetch_count(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 2);
        assert_eq!(a.features[0].properties.filter, Some(MetricKind::MedianPrice));
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_fetch() {
        let (_clock, source, svc) = service();
        let gate = source.hold_fetches();

        let (a, b, ()) = tokio::join!(
            svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::State, Some("CA")),
            svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::State, Some("CA")),
            async {
                tokio::task::yield_now().await;
                gate.open();
            }
        );

        assert_eq!(source.fetch_count(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        let key = FeatureQuery::new(MetricKind::MedianPrice, "2024-05-01", ScopeKind::State, Some("CA")).cache_key();
        assert_eq!(svc.preload_status(&key), Some(PreloadStatus::Loaded));
    }

    #[tokio::test]
    async fn expired_entry_triggers_refetch() {
        let (clock, source, svc) = service();
        svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::Country, None).await;
        clock.advance_ms(DEFAULT_TTL_MS + 1);
        svc.get_filter_geojson(MetricKind::MedianPrice, "2024-05-01", ScopeKind::Country, None).await;
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn failures_degrade_to_empty_and_are_not_cached() {
        let (_clock, source, svc) = service();
        source.fail(MetricKind::Inventory, FetchError::Status { status: 500, message: "boom".into() });

        let fc = svc.get_filter_geojson(MetricKind::Inventory, "2024-05-01", ScopeKind::Country, None).await;
        assert!(fc.is_empty());
        let key = FeatureQuery::new(MetricKind::Inventory, "2024-05-01", ScopeKind::Country, None).cache_key();
        assert_eq!(
            svc.preload_status(&key),
            Some(PreloadStatus::Error("API error 500: boom".to_string()))
        );

        svc.get_filter_geojson(MetricKind::Inventory, "2024-05-01", ScopeKind::Country, None).await;
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn dates_are_distinct_and_newest_first() {
        let (_clock, source, svc) = service();
        source.set_dates(vec![
            "2024-01-01".into(),
            "2024-03-01".into(),
            "2024-02-01".into(),
            "2024-03-01".into(),
        ]);
        let dates = svc.get_available_dates().await.expect("dates");
        assert_eq!(*dates, vec!["2024-03-01", "2024-02-01", "2024-01-01"]);
        assert_eq!(svc.get_latest_date().await.expect("latest"), "2024-03-01");

        source.set_dates(vec!["2030-01-01".into()]);
        assert_eq!(svc.get_latest_date().await.expect("cached"), "2024-03-01");
    }

    #[tokio::test]
    async fn latest_date_of_empty_dataset_is_an_error() {
        let (_clock, _source, svc) = service();
        assert!(matches!(svc.get_latest_date().await, Err(FetchError::NoData(_))));
    }

    #[tokio::test]
    async fn preload_warms_every_combination() {
        let (_clock, source, svc) = service();
        source.insert(MetricKind::Sold, FeatureCollection { features: vec![square("CA", 10.0)] });
        let dates = vec!["2024-01-01".to_string(), "2024-02-01".to_string()];

        svc.preload_data(&[MetricKind::MedianPrice, MetricKind::Sold], &dates, ScopeKind::State, Some("CA"))
            .await
            .expect("preload");
        assert_eq!(source.fetch_count(), 4);
        assert_eq!(svc.cache().len(), 4);

        svc.get_filter_geojson(MetricKind::Sold, "2024-02-01", ScopeKind::State, Some("CA")).await;
        assert_eq!(source.fetch_count(), 4);
    }

    #[tokio::test]
    async fn preload_reports_first_failure() {
        let (_clock, source, svc) = service();
        source.fail(MetricKind::Condo, FetchError::Transport("connection refused".into()));
        let err = svc
            .preload_data(&[MetricKind::MedianPrice, MetricKind::Condo], &["2024-01-01".to_string()], ScopeKind::Country, None)
            .await
            .expect_err("condo fails");
        assert_eq!(err, FetchError::Transport("connection refused".into()));
    }

    #[test]
    fn default_config_keeps_a_day_of_data() {
        let svc = GeoDataService::from_config(&ServiceConfig::default());
        assert_eq!(svc.cache().ttl_ms(), DEFAULT_TTL_MS);
        assert!(svc.cache().is_empty());
    }

    #[tokio::test]
    async fn metric_value_for_region() {
        let (_clock, _source, svc) = service();
        assert_eq!(svc.get_metric_value("TX", MetricKind::MedianPrice, "2024-05-01").await, Some(340_000.0));
        assert_eq!(svc.get_metric_value("ZZ", MetricKind::MedianPrice, "2024-05-01").await, None);
    }
}
