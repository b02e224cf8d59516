use catalog::MetricKind;
use foundation::scope::ScopeKind;
use serde_json::{Value, json};

/// Color used for values at or above `threshold` (interpolated towards the next stop).
#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub threshold: f64,
    pub color: String,
}

impl ColorStop {
    pub fn new(threshold: f64, color: impl Into<String>) -> Self {
        Self {
            threshold,
            color: color.into(),
        }
    }
}

/// Ordered stops of a linear color ramp. Thresholds are strictly ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorScale {
    pub stops: Vec<ColorStop>,
}

impl ColorScale {
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Map-engine paint expression:
    /// `["interpolate", ["linear"], ["get", "value"], t0, c0, t1, c1, ...]`.
    pub fn to_expression(&self) -> Value {
        let mut expr = vec![json!("interpolate"), json!(["linear"]), json!(["get", "value"])];
        for stop in &self.stops {
            expr.push(json!(stop.threshold));
            expr.push(json!(stop.color));
        }
        Value::Array(expr)
    }

    /// Color for `value`, clamped to the first and last stops.
    pub fn color_at(&self, value: f64) -> Option<String> {
        let first = self.stops.first()?;
        if value <= first.threshold {
            return Some(first.color.clone());
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if value <= hi.threshold {
                let t = (value - lo.threshold) / (hi.threshold - lo.threshold);
                return Some(lerp_hex(&lo.color, &hi.color, t));
            }
        }
        self.stops.last().map(|s| s.color.clone())
    }
}

/// Color ramp for `metric` at `scope`.
///
/// Finer scopes get more stops: county splits every other interval, city
/// every interval once, zipcode every interval into thirds. Median price
/// thresholds drop to 80% at city and zipcode scope.
pub fn get_color_scale_expression(metric: MetricKind, scope: ScopeKind) -> ColorScale {
    let spec = metric.spec();
    let scale = if metric == MetricKind::MedianPrice && matches!(scope, ScopeKind::City | ScopeKind::Zipcode) {
        0.8
    } else {
        1.0
    };

    let mut base: Vec<ColorStop> = spec
        .steps
        .iter()
        .zip(spec.palette)
        .map(|(step, color)| ColorStop::new(step * scale, *color))
        .collect();

    if spec.palette.len() > spec.steps.len()
        && let (Some(last_step), Some(last_color)) = (spec.steps.last(), spec.palette.last())
    {
        base.push(ColorStop::new(last_step * scale * 1.5, *last_color));
    }

    ColorScale {
        stops: subdivide(base, scope),
    }
}

fn subdivide(base: Vec<ColorStop>, scope: ScopeKind) -> Vec<ColorStop> {
    let splits_for = |interval: usize| -> usize {
        match scope {
            ScopeKind::Country | ScopeKind::State => 0,
            ScopeKind::County => usize::from(interval % 2 == 0),
            ScopeKind::City => 1,
            ScopeKind::Zipcode => 2,
        }
    };

    let mut out = Vec::with_capacity(base.len() * 3);
    for (i, pair) in base.windows(2).enumerate() {
        let (lo, hi) = (&pair[0], &pair[1]);
        out.push(lo.clone());
        let n = splits_for(i);
        for k in 1..=n {
            let t = k as f64 / (n + 1) as f64;
            out.push(ColorStop::new(
                lo.threshold + (hi.threshold - lo.threshold) * t,
                lerp_hex(&lo.color, &hi.color, t),
            ));
        }
    }
    if let Some(last) = base.last() {
        out.push(last.clone());
    }
    out
}

fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Linear blend of two `#rrggbb` colors. Unparseable input yields `a`.
pub fn lerp_hex(a: &str, b: &str, t: f64) -> String {
    let (Some(ca), Some(cb)) = (parse_hex(a), parse_hex(b)) else {
        return a.to_string();
    };
    let t = t.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * t).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        mix(ca[0], cb[0]),
        mix(ca[1], cb[1]),
        mix(ca[2], cb[2])
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn thresholds(scale: &ColorScale) -> Vec<f64> {
        scale.stops.iter().map(|s| s.threshold).collect()
    }

    #[test]
    fn state_scope_uses_base_stops() {
        let scale = get_color_scale_expression(MetricKind::MedianPrice, ScopeKind::State);
        assert_eq!(thresholds(&scale), vec![200_000.0, 500_000.0, 800_000.0, 1_200_000.0]);
        assert_eq!(scale.stops[0].color, "#e5f5e0");
        assert_eq!(scale.stops[3].color, "#006d2c");
    }

    #[test]
    fn extra_palette_color_adds_terminal_stop() {
        let scale = get_color_scale_expression(MetricKind::PriceChange, ScopeKind::Country);
        let last = scale.stops.last().expect("stops");
        assert_eq!(last.threshold, 22.5);
        assert_eq!(last.color, "#66bd63");
        assert_eq!(scale.len(), 7);
    }

    #[test]
    fn city_median_price_is_scaled_and_split() {
        let scale = get_color_scale_expression(MetricKind::MedianPrice, ScopeKind::City);
        assert_eq!(
            thresholds(&scale),
            vec![160_000.0, 280_000.0, 400_000.0, 520_000.0, 640_000.0, 800_000.0, 960_000.0]
        );
    }

    #[test]
    fn county_splits_every_other_interval() {
        let scale = get_color_scale_expression(MetricKind::DaysOnMarket, ScopeKind::County);
        assert_eq!(thresholds(&scale), vec![20.0, 30.0, 40.0, 60.0, 70.0, 80.0, 120.0]);
    }

    #[test]
    fn zipcode_thirds_every_interval() {
        let scale = get_color_scale_expression(MetricKind::PriceCuts, ScopeKind::Zipcode);
        // Four steps plus a terminal stop at 60, two inserts per interval.
        assert_eq!(scale.len(), 5 + 4 * 2);
        let t = thresholds(&scale);
        assert!((t[1] - 13.333_333).abs() < 1e-4);
        assert!((t[2] - 16.666_666).abs() < 1e-4);
    }

    #[test]
    fn finer_scopes_never_have_fewer_stops() {
        for metric in MetricKind::all() {
            let state = get_color_scale_expression(metric, ScopeKind::State).len();
            let zip = get_color_scale_expression(metric, ScopeKind::Zipcode).len();
            assert!(zip >= state, "{metric}: {zip} < {state}");
        }
    }

    #[test]
    fn thresholds_ascend_at_every_scope() {
        for metric in MetricKind::all() {
            for scope in ScopeKind::ALL {
                let t = thresholds(&get_color_scale_expression(metric, scope));
                assert!(t.windows(2).all(|w| w[0] < w[1]), "{metric} at {scope}: {t:?}");
            }
        }
    }

    #[test]
    fn expression_shape() {
        let expr = get_color_scale_expression(MetricKind::Inventory, ScopeKind::State).to_expression();
        assert_eq!(
            expr,
            json!([
                "interpolate", ["linear"], ["get", "value"],
                100.0, "#feedde", 500.0, "#fdbe85", 1000.0, "#fd8d3c", 2000.0, "#e6550d", 3000.0, "#a63603"
            ])
        );
    }

    #[test]
    fn interpolated_colors() {
        assert_eq!(lerp_hex("#000000", "#ffffff", 0.5), "#808080");
        assert_eq!(lerp_hex("#102030", "#102030", 0.3), "#102030");
        assert_eq!(lerp_hex("red", "#ffffff", 0.5), "red");

        let scale = ColorScale {
            stops: vec![ColorStop::new(0.0, "#000000"), ColorStop::new(10.0, "#0000ff")],
        };
        assert_eq!(scale.color_at(-5.0).as_deref(), Some("#000000"));
        assert_eq!(scale.color_at(5.0).as_deref(), Some("#000080"));
        assert_eq!(scale.color_at(50.0).as_deref(), Some("#0000ff"));
    }
}
