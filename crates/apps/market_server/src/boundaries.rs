//! Static boundary collections served from `<root>/geojson/<kind>.geojson`,
//! held in memory for a day after first read.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use foundation::time::{Clock, MS_PER_DAY};
use serde_json::Value;
use tracing::{debug, info};

pub const BOUNDARY_TTL_MS: u64 = MS_PER_DAY;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    States,
    Counties,
    Cities,
    Zipcodes,
}

impl BoundaryKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "states" => Some(BoundaryKind::States),
            "counties" => Some(BoundaryKind::Counties),
            "cities" => Some(BoundaryKind::Cities),
            "zipcodes" => Some(BoundaryKind::Zipcodes),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryKind::States => "states",
            BoundaryKind::Counties => "counties",
            BoundaryKind::Cities => "cities",
            BoundaryKind::Zipcodes => "zipcodes",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            BoundaryKind::States => "state",
            BoundaryKind::Counties => "county",
            BoundaryKind::Cities => "city",
            BoundaryKind::Zipcodes => "zipcode",
        }
    }
}

#[derive(Debug)]
pub enum BoundaryError {
    NotFound(BoundaryKind),
    Io(String),
    Parse(String),
}

impl std::fmt::Display for BoundaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryError::NotFound(kind) => write!(f, "Boundary data not found for type: {}", kind.as_str()),
            BoundaryError::Io(msg) => write!(f, "failed to read boundary file: {msg}"),
            BoundaryError::Parse(msg) => write!(f, "invalid boundary file: {msg}"),
        }
    }
}

impl std::error::Error for BoundaryError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
struct CachedBoundary {
    data: Arc<Value>,
    loaded_at_ms: u64,
}

pub struct BoundaryStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    cache: DashMap<BoundaryKind, CachedBoundary>,
}

impl BoundaryStore {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            ttl_ms: BOUNDARY_TTL_MS,
            cache: DashMap::new(),
        }
    }

    pub fn path_for(&self, kind: BoundaryKind) -> PathBuf {
        self.root.join("geojson").join(format!("{}.geojson", kind.file_stem()))
    }

    fn cached(&self, kind: BoundaryKind) -> Option<Arc<Value>> {
        let entry = self.cache.get(&kind)?;
        let age = self.clock.now_ms().saturating_sub(entry.loaded_at_ms);
        (age < self.ttl_ms).then(|| entry.data.clone())
    }

    /// Cached collection for `kind`, reading the file on miss or expiry.
    /// Concurrent misses may both read the file; the last write wins.
    pub async fn get(&self, kind: BoundaryKind) -> Result<(Arc<Value>, CacheStatus), BoundaryError> {
        if let Some(data) = self.cached(kind) {
            debug!("boundary cache hit: {}", kind.as_str());
            return Ok((data, CacheStatus::Hit));
        }

        let path = self.path_for(kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(BoundaryError::NotFound(kind)),
            Err(e) => return Err(BoundaryError::Io(format!("{}: {e}", path.display()))),
        };
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| BoundaryError::Parse(e.to_string()))?;
        let data = Arc::new(value);

        info!("loaded boundaries {} ({} bytes)", path.display(), bytes.len());
        self.cache.insert(
            kind,
            CachedBoundary {
                data: data.clone(),
                loaded_at_ms: self.clock.now_ms(),
            },
        );
        Ok((data, CacheStatus::Miss))
    }
}

impl std::fmt::Debug for BoundaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryStore")
            .field("root", &self.root)
            .field("ttl_ms", &self.ttl_ms)
            .field("cached", &self.cache.len())
            .finish()
    }
}
