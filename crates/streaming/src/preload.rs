use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};

use crate::protocol::FeatureCollection;
use crate::source::FetchError;

pub type FetchResult = Result<Arc<FeatureCollection>, FetchError>;

/// An in-flight fetch that any number of callers can await.
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Per-key fetch bookkeeping used to collapse concurrent requests.
#[derive(Clone)]
pub enum PreloadState {
    /// Registered by a bulk preload but not started yet.
    Pending,
    /// `generation` identifies which fetch owns the slot, so a late finisher
    /// never overwrites the state of a newer fetch for the same key.
    Loading { generation: u64, fetch: SharedFetch },
    Loaded,
    Error(String),
}

/// Future-free view of [`PreloadState`] for inspection and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadStatus {
    Pending,
    Loading,
    Loaded,
    Error(String),
}

impl PreloadState {
    pub fn status(&self) -> PreloadStatus {
        match self {
            PreloadState::Pending => PreloadStatus::Pending,
            PreloadState::Loading { .. } => PreloadStatus::Loading,
            PreloadState::Loaded => PreloadStatus::Loaded,
            PreloadState::Error(msg) => PreloadStatus::Error(msg.clone()),
        }
    }

    pub fn in_flight(&self) -> Option<&SharedFetch> {
        match self {
            PreloadState::Loading { fetch, .. } => Some(fetch),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PreloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreloadState::Loading { generation, .. } => f
                .debug_struct("Loading")
                .field("generation", generation)
                .finish_non_exhaustive(),
            other => other.status().fmt(f),
        }
    }
}
