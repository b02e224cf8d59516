//! Closed table of market metrics: identity, display metadata, value domains,
//! palettes, and value formatting.

pub mod format;
pub mod metric;

pub use format::*;
pub use metric::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    UnknownMetric(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::UnknownMetric(id) => write!(f, "unknown metric: {id:?}"),
        }
    }
}

impl std::error::Error for CatalogError {}
