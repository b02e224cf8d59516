use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use foundation::time::{Clock, MS_PER_DAY, SystemClock};
use parking_lot::Mutex;

use crate::protocol::FeatureCollection;
use crate::request::CacheKey;

pub const DEFAULT_TTL_MS: u64 = MS_PER_DAY;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp_ms: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp_ms: u64) -> Self {
        Self { data, timestamp_ms }
    }

    pub fn is_fresh(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) < ttl_ms
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

/// Time-boxed cache for feature collections and the dataset's date list.
///
/// Every read checks freshness against the injected clock; an expired entry is
/// dropped on the spot and reported as a miss. Each check-then-set runs under a
/// single lock acquisition so concurrent callers observe a consistent map.
pub struct GeoDataCache {
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    features: Mutex<HashMap<CacheKey, CacheEntry<Arc<FeatureCollection>>>>,
    dates: Mutex<Option<CacheEntry<Arc<Vec<String>>>>>,
    latest_date: Mutex<Option<CacheEntry<String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl GeoDataCache {
    pub fn new(clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            clock,
            ttl_ms,
            features: Mutex::new(HashMap::new()),
            dates: Mutex::new(None),
            latest_date: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn with_system_clock(ttl_ms: u64) -> Self {
        Self::new(Arc::new(SystemClock), ttl_ms)
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn features(&self, key: &CacheKey) -> Option<Arc<FeatureCollection>> {
        let now = self.clock.now_ms();
        let mut map = self.features.lock();
        match map.get(key).map(|e| e.is_fresh(now, self.ttl_ms)) {
            Some(true) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                map.get(key).map(|e| Arc::clone(&e.data))
            }
            Some(false) => {
                map.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert_features(&self, key: CacheKey, data: Arc<FeatureCollection>) {
        let entry = CacheEntry::new(data, self.clock.now_ms());
        self.features.lock().insert(key, entry);
    }

    pub fn dates(&self) -> Option<Arc<Vec<String>>> {
        let now = self.clock.now_ms();
        let mut slot = self.dates.lock();
        take_if_stale(&mut slot, now, self.ttl_ms).map(|e| Arc::clone(&e.data))
    }

    pub fn set_dates(&self, dates: Arc<Vec<String>>) {
        *self.dates.lock() = Some(CacheEntry::new(dates, self.clock.now_ms()));
    }

    pub fn latest_date(&self) -> Option<String> {
        let now = self.clock.now_ms();
        let mut slot = self.latest_date.lock();
        take_if_stale(&mut slot, now, self.ttl_ms).map(|e| e.data.clone())
    }

    pub fn set_latest_date(&self, date: String) {
        *self.latest_date.lock() = Some(CacheEntry::new(date, self.clock.now_ms()));
    }

    /// Drops every expired entry. Returns the number of feature entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let removed = {
            let mut map = self.features.lock();
            let before = map.len();
            map.retain(|_, e| e.is_fresh(now, self.ttl_ms));
            before - map.len()
        };
        take_if_stale(&mut self.dates.lock(), now, self.ttl_ms);
        take_if_stale(&mut self.latest_date.lock(), now, self.ttl_ms);
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.features.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for GeoDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDataCache")
            .field("ttl_ms", &self.ttl_ms)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Clears `slot` if it holds an expired entry; returns the fresh entry if any.
fn take_if_stale<T>(slot: &mut Option<CacheEntry<T>>, now_ms: u64, ttl_ms: u64) -> Option<&CacheEntry<T>> {
    if slot.as_ref().is_some_and(|e| !e.is_fresh(now_ms, ttl_ms)) {
        *slot = None;
    }
    slot.as_ref()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CacheStats, DEFAULT_TTL_MS, GeoDataCache};
    use crate::protocol::FeatureCollection;
    use crate::request::FeatureQuery;
    use catalog::MetricKind;
    use foundation::scope::ScopeKind;
    use foundation::time::{MS_PER_HOUR, ManualClock};

    fn cache_with_clock() -> (Arc<ManualClock>, GeoDataCache) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = GeoDataCache::new(clock.clone(), DEFAULT_TTL_MS);
        (clock, cache)
    }

    #[test]
    fn fresh_entries_hit() {
        let (clock, cache) = cache_with_clock();
        let key = FeatureQuery::new(MetricKind::Inventory, "2024-01-01", ScopeKind::State, Some("CA")).cache_key();
        cache.insert_features(key.clone(), Arc::new(FeatureCollection::empty()));

        clock.advance_ms(23 * MS_PER_HOUR);
        assert!(cache.features(&key).is_some());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0, expired: 0 });
    }

    #[test]
    fn entries_expire_at_ttl() {
        let (clock, cache) = cache_with_clock();
        let key = FeatureQuery::new(MetricKind::Inventory, "2024-01-01", ScopeKind::State, None).cache_key();
        cache.insert_features(key.clone(), Arc::new(FeatureCollection::empty()));

        clock.advance_ms(DEFAULT_TTL_MS);
        assert!(cache.features(&key).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn overwrite_refreshes_timestamp() {
        let (clock, cache) = cache_with_clock();
        let key = FeatureQuery::new(MetricKind::Sold, "2024-01-01", ScopeKind::City, None).cache_key();
        cache.insert_features(key.clone(), Arc::new(FeatureCollection::empty()));
        clock.advance_ms(20 * MS_PER_HOUR);
        cache.insert_features(key.clone(), Arc::new(FeatureCollection::empty()));
        clock.advance_ms(20 * MS_PER_HOUR);
        assert!(cache.features(&key).is_some());
    }

    #[test]
    fn dates_follow_same_ttl() {
        let (clock, cache) = cache_with_clock();
        cache.set_dates(Arc::new(vec!["2024-02-01".into(), "2024-01-01".into()]));
        cache.set_latest_date("2024-02-01".into());
        assert_eq!(cache.latest_date().as_deref(), Some("2024-02-01"));

        clock.advance_ms(DEFAULT_TTL_MS + 1);
        assert!(cache.dates().is_none());
        assert!(cache.latest_date().is_none());
    }

    #[test]
    fn purge_removes_only_expired() {
        let (clock, cache) = cache_with_clock();
        let old = FeatureQuery::new(MetricKind::Sold, "2024-01-01", ScopeKind::City, None).cache_key();
        let new = FeatureQuery::new(MetricKind::Sold, "2024-02-01", ScopeKind::City, None).cache_key();
        cache.insert_features(old, Arc::new(FeatureCollection::empty()));
        clock.advance_ms(DEFAULT_TTL_MS - MS_PER_HOUR);
        cache.insert_features(new.clone(), Arc::new(FeatureCollection::empty()));
        clock.advance_ms(2 * MS_PER_HOUR);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.features(&new).is_some());
    }
}
