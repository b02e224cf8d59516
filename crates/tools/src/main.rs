use std::sync::Arc;

use catalog::MetricKind;
use clap::{Parser, Subcommand};
use foundation::scope::{GeographicScope, ScopeKind};
use layers::{
    generate_legend, get_color_scale_expression, HeadlessSurface, LayerReconciler, MapStyle, ReconcilerEvent,
};
use parking_lot::Mutex;
use scope::{NominatimGeocoder, ScopeResolver, NOMINATIM_URL};
use streaming::{GeoDataService, ServiceConfig};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;

use report::RenderReport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the market map layers")]
struct Args {
    /// Geocoder base URL (Nominatim-compatible)
    #[arg(long, env = "MAPDASH_GEOCODER", default_value = NOMINATIM_URL)]
    geocoder: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a place query and print the resolved scope
    Scope {
        query: String,
    },

    /// Print the color stops and legend bands for a metric
    Legend {
        /// Metric id (e.g. median_price)
        metric: String,

        /// Scope granularity used for the color stops
        #[arg(long, default_value = "country")]
        scope: String,
    },

    /// Reconcile layers against a market-data server and print the result
    Render {
        /// Market-data server base URL
        #[arg(long, env = "MAPDASH_SERVER", default_value = "http://localhost:3000")]
        server: String,

        /// Metric ids to render, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        metrics: Vec<String>,

        /// Dataset date (YYYY-MM-DD); the latest available date when omitted
        #[arg(long)]
        date: Option<String>,

        /// Place query narrowing the scope
        #[arg(long)]
        query: Option<String>,

        /// Base map style (streets, terrain, satellite)
        #[arg(long)]
        style: Option<String>,

        /// Metric whose legend is shown
        #[arg(long)]
        legend: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_metric(id: &str) -> Result<MetricKind, Box<dyn std::error::Error>> {
    Ok(MetricKind::parse(id.trim())?)
}

async fn resolve(geocoder: &str, query: Option<&str>) -> Result<GeographicScope, Box<dyn std::error::Error>> {
    let Some(query) = query else {
        return Ok(GeographicScope::national());
    };
    let resolver = ScopeResolver::new(Arc::new(NominatimGeocoder::new(geocoder)?));
    Ok(resolver.resolve_scope(query).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Scope { query } => {
            let scope = resolve(&args.geocoder, Some(query.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&scope)?);
        }
        Command::Legend { metric, scope } => {
            let metric = parse_metric(&metric)?;
            let kind = ScopeKind::parse(&scope).ok_or_else(|| format!("unknown scope {scope:?}"))?;
            let scale = get_color_scale_expression(metric, kind);
            println!("{} ({kind})", metric.display_name());
            for stop in &scale.stops {
                println!("  {:>14}  {}", stop.threshold, stop.color);
            }
            for item in generate_legend(metric) {
                println!("  {}  {}", item.color, item.label);
            }
        }
        Command::Render {
            server,
            metrics,
            date,
            query,
            style,
            legend,
            json,
        } => {
            let metrics = metrics.iter().map(|m| parse_metric(m)).collect::<Result<Vec<_>, _>>()?;
            let legend = legend.as_deref().map(parse_metric).transpose()?;
            let style = match style.as_deref() {
                Some(s) => Some(MapStyle::parse(s).ok_or_else(|| format!("unknown style {s:?}"))?),
                None => None,
            };
            let scope = resolve(&args.geocoder, query.as_deref()).await?;

            let config = ServiceConfig {
                base_url: server,
                ..ServiceConfig::default()
            };
            let service = Arc::new(GeoDataService::from_config(&config));
            let surface = Arc::new(Mutex::new(HeadlessSurface::new()));
            let mut reconciler = LayerReconciler::new(surface.clone(), service);

            let (tx, rx) = mpsc::unbounded_channel();
            match date {
                Some(date) => tx.send(ReconcilerEvent::DateChanged(date))?,
                None => reconciler.initialize().await?,
            }
            tx.send(ReconcilerEvent::ScopeChanged(scope))?;
            tx.send(ReconcilerEvent::FiltersChanged(metrics))?;
            if let Some(style) = style {
                tx.send(ReconcilerEvent::StyleSwapRequested(style))?;
            }
            if let Some(metric) = legend {
                tx.send(ReconcilerEvent::LegendSelected(metric))?;
            }
            drop(tx);

            surface.lock().finish_loading();
            reconciler.run(rx).await;
            info!("reconciler settled in {:?}", reconciler.state());

            let report = RenderReport::capture(&reconciler);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.to_text());
            }
        }
    }
    Ok(())
}
