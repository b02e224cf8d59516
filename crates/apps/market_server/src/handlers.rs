use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog::MetricKind;
use foundation::scope::ScopeKind;
use foundation::time::parse_iso_date;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::boundaries::{BoundaryError, BoundaryKind, BoundaryStore};
use crate::snapshot::{MarketSnapshot, SnapshotError};

pub const BOUNDARY_CACHE_CONTROL: &str = "public, max-age=86400";
const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Clone, Debug)]
pub struct AppState {
    pub snapshot: Arc<MarketSnapshot>,
    pub boundaries: Arc<BoundaryStore>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataParams {
    pub filter: Option<String>,
    pub date: Option<String>,
    pub geo_scope: Option<String>,
    pub geo_id: Option<String>,
    pub region_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Scope filtering applies only when both `geoScope` and `geoId` are present.
/// Unknown scopes fall back to the unfiltered set.
fn scope_filter(params: &MarketDataParams) -> Option<ScopeKind> {
    let (Some(scope), Some(_)) = (non_empty(&params.geo_scope), non_empty(&params.geo_id)) else {
        return None;
    };
    match ScopeKind::parse(scope) {
        Some(ScopeKind::Country) => None,
        Some(kind) => Some(kind),
        None => {
            debug!("ignoring unknown geoScope {scope:?}");
            None
        }
    }
}

pub async fn market_data(
    State(state): State<AppState>,
    Query(params): Query<MarketDataParams>,
) -> Result<Response, ApiError> {
    let filter = non_empty(&params.filter)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required parameter: filter"))?;
    let date = non_empty(&params.date)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required parameter: date"))?;
    let metric = MetricKind::parse(filter).map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid filter type"))?;
    if parse_iso_date(date).is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid date"));
    }

    if let Some(region_id) = non_empty(&params.region_id) {
        return state
            .snapshot
            .region_metrics(region_id, date)
            .map(|region| Json(region).into_response())
            .map_err(snapshot_error);
    }

    let scope = scope_filter(&params);
    state
        .snapshot
        .features(metric, date, scope)
        .map(|fc| Json(fc).into_response())
        .map_err(snapshot_error)
}

fn snapshot_error(err: SnapshotError) -> ApiError {
    match err {
        SnapshotError::RegionNotFound { .. } | SnapshotError::DateNotFound(_) => {
            warn!("{err}");
            api_error(StatusCode::NOT_FOUND, err.to_string())
        }
        SnapshotError::Io(_) | SnapshotError::Parse(_) => {
            error!("market data failed: {err}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

pub async fn market_dates(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.snapshot.dates())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapefileParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub geo_scope: Option<String>,
}

pub async fn shapefile(
    State(state): State<AppState>,
    Query(params): Query<ShapefileParams>,
) -> Result<Response, ApiError> {
    let requested = params.kind.or(params.geo_scope).unwrap_or_default();
    let kind = BoundaryKind::parse(&requested).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "Invalid boundary type. Must be one of: states, counties, cities, zipcodes",
        )
    })?;

    match state.boundaries.get(kind).await {
        Ok((data, status)) => Ok((
            [
                (header::CACHE_CONTROL, BOUNDARY_CACHE_CONTROL),
                (X_CACHE, status.as_str()),
            ],
            Json(data),
        )
            .into_response()),
        Err(err @ BoundaryError::NotFound(_)) => {
            warn!("{err}");
            Err(api_error(StatusCode::NOT_FOUND, err.to_string()))
        }
        Err(err) => {
            error!("boundary load failed: {err}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch boundary data"))
        }
    }
}

pub async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}
