//! Text heuristics that place a search at a geographic granularity.

use std::sync::LazyLock;

use foundation::scope::ScopeKind;
use regex::Regex;

use crate::states::state_code;

static ZIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").expect("zip pattern"));
static COUNTY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bcounty\b").expect("county pattern"));
static DISPLAY_STATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r", ([A-Z]{2}),").expect("state pattern"));

/// Granularity of a search, from the raw query and the geocoder's display
/// text when there is one. Rules apply in order; the first match wins:
///
/// 1. a 5-digit or ZIP+4 code in the query is a zipcode;
/// 2. "County" in the query, or in the leading segment of the display text
///    (the place itself, not an enclosing county), is a county;
/// 3. `place, ST` in the query is a city; a display text containing
///    `, ST,` is a state with at most three comma segments and a city otherwise;
/// 4. a query that is exactly a state name or code is a state;
/// 5. anything else is national.
pub fn classify_scope(query: &str, display_name: Option<&str>) -> ScopeKind {
    let query = query.trim();
    let display = display_name.unwrap_or_default();

    if ZIP.is_match(query) {
        return ScopeKind::Zipcode;
    }
    let leading = display.split(',').next().unwrap_or_default();
    if COUNTY.is_match(query) || leading.contains("County") {
        return ScopeKind::County;
    }
    if let Some((place, state)) = query.rsplit_once(',')
        && !place.trim().is_empty()
        && state_code(state).is_some()
    {
        return ScopeKind::City;
    }
    if let Some(caps) = DISPLAY_STATE.captures(display)
        && state_code(&caps[1]).is_some()
    {
        return if display.split(',').count() <= 3 {
            ScopeKind::State
        } else {
            ScopeKind::City
        };
    }
    if state_code(query).is_some() {
        return ScopeKind::State;
    }
    ScopeKind::Country
}

/// Half-width in degrees of the box assumed around a geocoded point.
pub fn padding_for(kind: ScopeKind) -> f64 {
    match kind {
        ScopeKind::Zipcode => 0.05,
        ScopeKind::City => 0.1,
        ScopeKind::County => 0.5,
        ScopeKind::State => 2.0,
        ScopeKind::Country => 5.0,
    }
}

pub fn zoom_for(kind: ScopeKind) -> f64 {
    match kind {
        ScopeKind::Country => 3.5,
        ScopeKind::State => 6.0,
        ScopeKind::County => 8.0,
        ScopeKind::City => 10.0,
        ScopeKind::Zipcode => 12.0,
    }
}
