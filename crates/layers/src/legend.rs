use catalog::{MetricKind, format_metric_value};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendItem {
    pub color: String,
    pub label: String,
}

/// One band below the first threshold, one per consecutive pair of
/// thresholds, and one above the last. Metrics without thresholds have no
/// legend.
pub fn generate_legend(metric: MetricKind) -> Vec<LegendItem> {
    let spec = metric.spec();
    let (Some(first), Some(last)) = (spec.steps.first(), spec.steps.last()) else {
        return Vec::new();
    };
    let fmt = |v: f64| format_metric_value(Some(v), metric);
    let color = |i: usize| spec.palette.get(i).copied().unwrap_or_default().to_string();

    let mut items = Vec::with_capacity(spec.steps.len() + 1);
    items.push(LegendItem {
        color: color(0),
        label: format!("< {}", fmt(*first)),
    });
    for (i, pair) in spec.steps.windows(2).enumerate() {
        items.push(LegendItem {
            color: color(i + 1),
            label: format!("{} - {}", fmt(pair[0]), fmt(pair[1])),
        });
    }
    items.push(LegendItem {
        color: color(spec.palette.len().saturating_sub(1)),
        label: format!("> {}", fmt(*last)),
    });
    items
}
