use serde::{Deserialize, Serialize};

/// Axis-aligned lon/lat box, serialized as `[[west, south], [east, north]]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 2]; 2]", into = "[[f64; 2]; 2]")]
pub struct LonLatBounds {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl LonLatBounds {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        LonLatBounds { min, max }
    }

    /// Square box of `padding_deg` around a point.
    pub fn around(lon: f64, lat: f64, padding_deg: f64) -> Self {
        Self::new(
            [lon - padding_deg, lat - padding_deg],
            [lon + padding_deg, lat + padding_deg],
        )
    }

    /// Tight box around a ring of `[lon, lat]` positions.
    ///
    /// Returns `None` for an empty ring or one without finite coordinates.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a [f64; 2]>) -> Option<Self> {
        let mut min = [f64::INFINITY, f64::INFINITY];
        let mut max = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        let mut any = false;
        for p in positions {
            if !p[0].is_finite() || !p[1].is_finite() {
                continue;
            }
            min[0] = min[0].min(p[0]);
            min[1] = min[1].min(p[1]);
            max[0] = max[0].max(p[0]);
            max[1] = max[1].max(p[1]);
            any = true;
        }
        any.then(|| Self::new(min, max))
    }

    pub fn center(&self) -> [f64; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min[0] && lon <= self.max[0] && lat >= self.min[1] && lat <= self.max[1]
    }
}

impl From<[[f64; 2]; 2]> for LonLatBounds {
    fn from(v: [[f64; 2]; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<LonLatBounds> for [[f64; 2]; 2] {
    fn from(b: LonLatBounds) -> Self {
        [b.min, b.max]
    }
}
