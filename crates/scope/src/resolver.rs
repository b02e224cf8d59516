use std::sync::Arc;

use foundation::bounds::LonLatBounds;
use foundation::scope::GeographicScope;
use tracing::{debug, warn};

use crate::ScopeError;
use crate::classify::{classify_scope, padding_for};
use crate::geocoder::Geocoder;

/// Longest query forwarded to the geocoder.
pub const MAX_QUERY_LEN: usize = 256;

/// Turns free-text searches into a [`GeographicScope`].
#[derive(Clone)]
pub struct ScopeResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl ScopeResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    /// An empty query is the national scope. A geocoder failure or miss
    /// still classifies the query, without bounds.
    pub async fn resolve_scope(&self, query: &str) -> Result<GeographicScope, ScopeError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(GeographicScope::national());
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(ScopeError::QueryTooLong(query.len()));
        }

        let hit = match self.geocoder.search(query).await {
            Ok(hits) => hits.into_iter().next(),
            Err(err) => {
                warn!("error geocoding {query:?}: {err}");
                None
            }
        };

        let Some(hit) = hit else {
            let kind = classify_scope(query, None);
            debug!("no geocoder hit for {query:?}, classified as {kind}");
            return Ok(GeographicScope {
                kind,
                id: query.to_string(),
                name: query.to_string(),
                bounds: None,
            });
        };

        let kind = classify_scope(query, Some(&hit.display_name));
        debug!("{query:?} resolved to {kind} {:?}", hit.display_name);
        Ok(GeographicScope {
            kind,
            id: hit.osm_id.map_or_else(|| query.to_string(), |id| id.to_string()),
            name: hit.display_name,
            bounds: Some(LonLatBounds::around(hit.lon, hit.lat, padding_for(kind))),
        })
    }
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocoder::{GeocodeHit, StaticGeocoder};
    use foundation::scope::ScopeKind;
    use pretty_assertions::assert_eq;

    fn hit(lon: f64, lat: f64, display: &str, osm_id: Option<u64>) -> GeocodeHit {
        GeocodeHit {
            lon,
            lat,
            display_name: display.to_string(),
            osm_id,
        }
    }

    fn resolver() -> ScopeResolver {
        let geocoder = StaticGeocoder::new()
            .with_hit("90210", hit(-118.4, 34.1, "Beverly Hills, Los Angeles County, California, 90210, United States", Some(1)))
            .with_hit("Los Angeles, CA", hit(-118.24, 34.05, "Los Angeles, Los Angeles County, California, United States", Some(207359)))
            .with_hit("California", hit(-119.27, 37.27, "California, United States", Some(165475)))
            .with_hit("Orange County, CA", hit(-117.76, 33.7, "Orange County, California, United States", None));
        ScopeResolver::new(Arc::new(geocoder))
    }

    #[tokio::test]
    async fn empty_query_is_national() {
        assert_eq!(resolver().resolve_scope("   ").await.unwrap(), GeographicScope::national());
    }

    #[tokio::test]
    async fn zip_takes_priority_over_county_text() {
        let scope = resolver().resolve_scope("90210").await.unwrap();
        assert_eq!(scope.kind, ScopeKind::Zipcode);
        assert_eq!(scope.bounds, Some(LonLatBounds::around(-118.4, 34.1, 0.05)));
    }

    #[tokio::test]
    async fn county_without_osm_id_uses_the_query() {
        let scope = resolver().resolve_scope("Orange County, CA").await.unwrap();
        assert_eq!(scope.kind, ScopeKind::County);
        assert_eq!(scope.id, "Orange County, CA");
        assert_eq!(scope.name, "Orange County, California, United States");
    }

    #[tokio::test]
    async fn city_inside_a_county() {
        let scope = resolver().resolve_scope("Los Angeles, CA").await.unwrap();
        assert_eq!(scope.kind, ScopeKind::City);
        assert_eq!(scope.bounds, Some(LonLatBounds::around(-118.24, 34.05, 0.1)));
        assert_eq!(scope.id, "207359");
    }

    #[tokio::test]
    async fn state_by_name() {
        let scope = resolver().resolve_scope("California").await.unwrap();
        assert_eq!(scope.kind, ScopeKind::State);
        let bounds = scope.bounds.expect("bounds");
        assert!((bounds.max[1] - bounds.min[1] - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn geocoder_failure_falls_back_to_the_query() {
        let r = ScopeResolver::new(Arc::new(StaticGeocoder::unreachable()));
        let scope = r.resolve_scope("Los Angeles, CA").await.unwrap();
        assert_eq!(scope.kind, ScopeKind::City);
        assert_eq!(scope.bounds, None);
        assert_eq!(scope.id, "Los Angeles, CA");
    }

    #[tokio::test]
    async fn overlong_queries_are_rejected() {
        let q = "a".repeat(MAX_QUERY_LEN + 1);
        assert!(matches!(resolver().resolve_scope(&q).await, Err(ScopeError::QueryTooLong(_))));
    }
}
