use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::ScopeError;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub lon: f64,
    pub lat: f64,
    pub display_name: String,
    pub osm_id: Option<u64>,
}

/// Forward geocoding. Only the first hit is used by the resolver.
pub trait Geocoder: Send + Sync {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<GeocodeHit>, ScopeError>>;
}

// Nominatim sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    osm_id: Option<u64>,
}

impl TryFrom<NominatimPlace> for GeocodeHit {
    type Error = ScopeError;

    fn try_from(place: NominatimPlace) -> Result<Self, Self::Error> {
        let coord = |s: &str| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| ScopeError::Decode(format!("bad coordinate {s:?}")))
        };
        Ok(GeocodeHit {
            lon: coord(&place.lon)?,
            lat: coord(&place.lat)?,
            display_name: place.display_name,
            osm_id: place.osm_id,
        })
    }
}

pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScopeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mapdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScopeError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<GeocodeHit>, ScopeError>> {
        Box::pin(async move {
            let url = format!("{}/search", self.base_url);
            let resp = self
                .client
                .get(&url)
                .query(&[("format", "json"), ("q", query), ("limit", "1")])
                .send()
                .await
                .map_err(|e| ScopeError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(ScopeError::Status(resp.status().as_u16()));
            }
            let places: Vec<NominatimPlace> = resp.json().await.map_err(|e| ScopeError::Decode(e.to_string()))?;
            places.into_iter().map(GeocodeHit::try_from).collect()
        })
    }
}

/// Fixed answers keyed by query, for tests and offline runs. Unknown queries
/// return no hits.
#[derive(Debug, Default)]
pub struct StaticGeocoder {
    hits: HashMap<String, GeocodeHit>,
    failing: bool,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hit(mut self, query: &str, hit: GeocodeHit) -> Self {
        self.hits.insert(query.to_string(), hit);
        self
    }

    /// Every search fails with a transport error.
    pub fn unreachable() -> Self {
        Self {
            hits: HashMap::new(),
            failing: true,
        }
    }
}

impl Geocoder for StaticGeocoder {
    fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<GeocodeHit>, ScopeError>> {
        Box::pin(async move {
            if self.failing {
                return Err(ScopeError::Transport("geocoder unreachable".to_string()));
            }
            Ok(self.hits.get(query).cloned().into_iter().collect())
        })
    }
}
