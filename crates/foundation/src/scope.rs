use serde::{Deserialize, Serialize};

use crate::bounds::LonLatBounds;

/// Geographic granularity at which metrics are displayed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Country,
    State,
    County,
    City,
    Zipcode,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 5] = [
        ScopeKind::Country,
        ScopeKind::State,
        ScopeKind::County,
        ScopeKind::City,
        ScopeKind::Zipcode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Country => "country",
            ScopeKind::State => "state",
            ScopeKind::County => "county",
            ScopeKind::City => "city",
            ScopeKind::Zipcode => "zipcode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// 0 for the coarsest scope, increasing with finer granularity.
    pub fn fineness(self) -> u8 {
        match self {
            ScopeKind::Country => 0,
            ScopeKind::State => 1,
            ScopeKind::County => 2,
            ScopeKind::City => 3,
            ScopeKind::Zipcode => 4,
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicScope {
    pub kind: ScopeKind,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<LonLatBounds>,
}

impl GeographicScope {
    pub fn national() -> Self {
        Self {
            kind: ScopeKind::Country,
            id: "US".to_string(),
            name: "United States".to_string(),
            bounds: None,
        }
    }

    pub fn is_national(&self) -> bool {
        self.kind == ScopeKind::Country
    }
}

impl Default for GeographicScope {
    fn default() -> Self {
        Self::national()
    }
}
