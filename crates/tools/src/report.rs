//! Printable summary of a headless reconciliation run.

use catalog::MetricKind;
use foundation::scope::GeographicScope;
use layers::{
    fill_layer_id, generate_legend, get_color_scale_expression, source_id, HeadlessSurface, LayerReconciler,
    LegendItem, ReconcilerStatus,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub metric: MetricKind,
    pub layer_id: String,
    pub features: usize,
    pub stops: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderReport {
    pub status: String,
    pub date: Option<String>,
    pub scope: GeographicScope,
    pub style: String,
    pub layers: Vec<LayerSummary>,
    pub legend_metric: Option<MetricKind>,
    pub legend: Vec<LegendItem>,
}

fn status_label(status: &ReconcilerStatus) -> String {
    match status {
        ReconcilerStatus::Idle => "idle".to_string(),
        ReconcilerStatus::Loading => "loading".to_string(),
        ReconcilerStatus::Ready => "ready".to_string(),
        ReconcilerStatus::Error { message, .. } => format!("error: {message}"),
        ReconcilerStatus::Fatal { message } => format!("fatal: {message}"),
    }
}

impl RenderReport {
    pub fn capture(reconciler: &LayerReconciler<HeadlessSurface>) -> Self {
        let inputs = reconciler.inputs();
        let surface = reconciler.surface().lock();

        let layers = reconciler
            .active_layers()
            .ids()
            .map(|metric| LayerSummary {
                metric,
                layer_id: fill_layer_id(metric).to_string(),
                features: surface.source_data(&source_id(metric)).map_or(0, |fc| fc.len()),
                stops: get_color_scale_expression(metric, inputs.scope.kind).len(),
            })
            .collect();

        let legend_metric = reconciler.legend_filter();
        Self {
            status: status_label(reconciler.status()),
            date: inputs.date.clone(),
            scope: inputs.scope.clone(),
            style: surface.style().to_string(),
            layers,
            legend_metric,
            legend: legend_metric.map(generate_legend).unwrap_or_default(),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "status: {}\ndate:   {}\nscope:  {} ({})\nstyle:  {}\n",
            self.status,
            self.date.as_deref().unwrap_or("-"),
            self.scope.name,
            self.scope.kind,
            self.style
        );
        if self.layers.is_empty() {
            out.push_str("layers: none\n");
        }
        for layer in &self.layers {
            out.push_str(&format!(
                "layer {:<24} {:>6} features  {:>2} stops\n",
                layer.metric.display_name(),
                layer.features,
                layer.stops
            ));
        }
        if let Some(metric) = self.legend_metric {
            out.push_str(&format!("legend: {}\n", metric.display_name()));
            for item in &self.legend {
                out.push_str(&format!("  {}  {}\n", item.color, item.label));
            }
        }
        out
    }
}
