//! Metrics snapshot: region geometries plus per-region, per-date metric values,
//! loaded once at startup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use catalog::MetricKind;
use foundation::scope::ScopeKind;
use serde::Deserialize;
use streaming::protocol::{Feature, FeatureCollection, FeatureProperties, Geometry, RegionMetrics};
use tracing::warn;

#[derive(Debug)]
pub enum SnapshotError {
    Io(String),
    Parse(String),
    DateNotFound(String),
    RegionNotFound { region_id: String, date: String },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(msg) => write!(f, "failed to read snapshot: {msg}"),
            SnapshotError::Parse(msg) => write!(f, "invalid snapshot: {msg}"),
            SnapshotError::DateNotFound(date) => write!(f, "No data for date {date}"),
            SnapshotError::RegionNotFound { .. } => write!(f, "Region data not found"),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRegion {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub region_type: String,
    pub geometry: Geometry,
}

impl SnapshotRegion {
    fn is_kind(&self, kind: ScopeKind) -> bool {
        match kind {
            ScopeKind::Zipcode => self.region_type == "zip" || self.region_type == "zipcode",
            other => self.region_type == other.as_str(),
        }
    }
}

/// `values[region_id][date][metric_id]`
type Values = HashMap<String, BTreeMap<String, BTreeMap<String, f64>>>;

#[derive(Debug, Default, Deserialize)]
pub struct MarketSnapshot {
    pub regions: Vec<SnapshotRegion>,
    #[serde(default)]
    pub values: Values,
}

impl MarketSnapshot {
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SnapshotError::Io(format!("{}: {e}", path.display())))?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_slice(bytes).map_err(|e| SnapshotError::Parse(e.to_string()))?;
        let unknown: BTreeSet<&str> = snapshot
            .values
            .values()
            .flat_map(|by_date| by_date.values())
            .flat_map(|metrics| metrics.keys())
            .filter(|id| MetricKind::parse(id).is_err())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            warn!("ignoring unknown metrics in snapshot: {unknown:?}");
        }
        Ok(snapshot)
    }

    /// Every date with at least one value, newest first.
    pub fn dates(&self) -> Vec<String> {
        let dates: BTreeSet<&String> = self.values.values().flat_map(|by_date| by_date.keys()).collect();
        dates.into_iter().rev().cloned().collect()
    }

    fn has_date(&self, date: &str) -> bool {
        self.values.values().any(|by_date| by_date.contains_key(date))
    }

    fn value(&self, region_id: &str, date: &str, metric: MetricKind) -> Option<f64> {
        self.values.get(region_id)?.get(date)?.get(metric.id()).copied()
    }

    /// One feature per region carrying a value for `metric` on `date`.
    /// `scope` limits the region type; `None` includes every region.
    pub fn features(
        &self,
        metric: MetricKind,
        date: &str,
        scope: Option<ScopeKind>,
    ) -> Result<FeatureCollection, SnapshotError> {
        if !self.has_date(date) {
            return Err(SnapshotError::DateNotFound(date.to_string()));
        }

        let features = self
            .regions
            .iter()
            .filter(|r| scope.map_or(true, |kind| r.is_kind(kind)))
            .filter_map(|r| {
                let value = self.value(&r.id, date, metric)?;
                Some(Feature {
                    id: Some(r.id.clone()),
                    properties: FeatureProperties {
                        id: r.id.clone(),
                        name: r.name.clone(),
                        region_type: r.region_type.clone(),
                        value: Some(value),
                        filter: Some(metric),
                        date: Some(date.to_string()),
                    },
                    geometry: r.geometry.clone(),
                })
            })
            .collect();
        Ok(FeatureCollection { features })
    }

    pub fn region_metrics(&self, region_id: &str, date: &str) -> Result<RegionMetrics, SnapshotError> {
        let not_found = || SnapshotError::RegionNotFound {
            region_id: region_id.to_string(),
            date: date.to_string(),
        };
        let region = self.regions.iter().find(|r| r.id == region_id).ok_or_else(not_found)?;
        let values = self.values.get(region_id).and_then(|d| d.get(date)).ok_or_else(not_found)?;

        let metrics = values
            .iter()
            .filter_map(|(id, v)| MetricKind::parse(id).ok().map(|m| (m, *v)))
            .collect();
        Ok(RegionMetrics {
            id: region.id.clone(),
            name: region.name.clone(),
            timestamp: date.to_string(),
            metrics,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const SAMPLE: &str = r#"{
        "regions": [
            {"id": "CA", "name": "California", "type": "state",
             "geometry": {"type": "Polygon", "coordinates": [[[-124,32],[-114,32],[-114,42],[-124,42],[-124,32]]]}},
            {"id": "TX", "name": "Texas", "type": "state",
             "geometry": {"type": "Polygon", "coordinates": [[[-106,26],[-94,26],[-94,36],[-106,36],[-106,26]]]}},
            {"id": "90210", "name": "Beverly Hills", "type": "zip",
             "geometry": {"type": "Polygon", "coordinates": [[[-118.43,34.07],[-118.38,34.07],[-118.38,34.11],[-118.43,34.11],[-118.43,34.07]]]}}
        ],
        "values": {
            "CA": {"2024-01-01": {"median_price": 780000, "inventory": 4200},
                   "2024-02-01": {"median_price": 790000, "not_a_metric": 1}},
            "TX": {"2024-02-01": {"median_price": 340000}},
            "90210": {"2024-02-01": {"median_price": 3100000}}
        }
    }"#;

    pub(crate) fn sample() -> MarketSnapshot {
        MarketSnapshot::from_slice(SAMPLE.as_bytes()).expect("sample snapshot")
    }

    #[test]
    fn dates_are_distinct_newest_first() {
        assert_eq!(sample().dates(), vec!["2024-02-01", "2024-01-01"]);
    }

    #[test]
    fn features_for_a_date() {
        let fc = sample().features(MetricKind::MedianPrice, "2024-02-01", None).unwrap();
        let ids: Vec<&str> = fc.features.iter().map(|f| f.properties.id.as_str()).collect();
        assert_eq!(ids, vec!["CA", "TX", "90210"]);
        assert_eq!(fc.features[1].properties.value, Some(340_000.0));
        assert_eq!(fc.features[1].properties.filter, Some(MetricKind::MedianPrice));
    }

    #[test]
    fn regions_without_a_value_are_left_out() {
        let fc = sample().features(MetricKind::Inventory, "2024-01-01", None).unwrap();
        assert_eq!(fc.len(), 1);
    }

    #[test]
    fn scope_limits_region_type() {
        let snap = sample();
        let zips = snap.features(MetricKind::MedianPrice, "2024-02-01", Some(ScopeKind::Zipcode)).unwrap();
        assert_eq!(zips.len(), 1);
        assert_eq!(zips.features[0].properties.id, "90210");
        let counties = snap.features(MetricKind::MedianPrice, "2024-02-01", Some(ScopeKind::County)).unwrap();
        assert!(counties.is_empty());
    }

    #[test]
    fn unknown_date() {
        let err = sample().features(MetricKind::MedianPrice, "1999-01-01", None).unwrap_err();
        assert!(matches!(err, SnapshotError::DateNotFound(_)));
    }

    #[test]
    fn region_metrics_skip_unknown_ids() {
        let snap = sample();
        let region = snap.region_metrics("CA", "2024-02-01").unwrap();
        assert_eq!(region.name, "California");
        assert_eq!(region.metrics.len(), 1);
        assert_eq!(region.metrics.get(&MetricKind::MedianPrice), Some(&790_000.0));
        assert!(snap.region_metrics("CA", "2023-01-01").is_err());
        assert!(snap.region_metrics("NV", "2024-02-01").is_err());
    }

    #[test]
    fn malformed_file() {
        assert!(matches!(MarketSnapshot::from_slice(b"{\"regions\": 3}"), Err(SnapshotError::Parse(_))));
    }
}
