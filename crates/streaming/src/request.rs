use catalog::MetricKind;
use foundation::scope::{GeographicScope, ScopeKind};

/// Composite cache key: `{metric}-{date}-{scope}-{scopeId}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One metric layer request: which metric, on which date, at which scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureQuery {
    pub metric: MetricKind,
    pub date: String,
    pub scope: ScopeKind,
    pub scope_id: Option<String>,
}

impl FeatureQuery {
    pub fn new(
        metric: MetricKind,
        date: impl Into<String>,
        scope: ScopeKind,
        scope_id: Option<&str>,
    ) -> Self {
        Self {
            metric,
            date: date.into(),
            scope,
            scope_id: scope_id.map(str::to_string),
        }
    }

    pub fn for_scope(metric: MetricKind, date: impl Into<String>, scope: &GeographicScope) -> Self {
        Self::new(metric, date, scope.kind, Some(scope.id.as_str()))
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey(format!(
            "{}-{}-{}-{}",
            self.metric.id(),
            self.date,
            self.scope.as_str(),
            self.scope_id.as_deref().unwrap_or("")
        ))
    }
}
