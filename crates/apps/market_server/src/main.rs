use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use foundation::time::SystemClock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod boundaries;
mod handlers;
mod snapshot;

use boundaries::BoundaryStore;
use handlers::AppState;
use snapshot::MarketSnapshot;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve market metrics and region boundaries from a snapshot file")]
struct Args {
    /// Listen address.
    #[arg(long, env = "MARKET_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Metrics snapshot JSON (`{ regions, values }`).
    #[arg(long, env = "MARKET_SNAPSHOT", default_value = "data/market_snapshot.json")]
    snapshot: PathBuf,

    /// Directory holding `geojson/<kind>.geojson` boundary files.
    #[arg(long, env = "BOUNDARY_ROOT", default_value = "public")]
    boundary_root: PathBuf,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/market-data", get(handlers::market_data))
        .route("/market-data/dates", get(handlers::market_dates))
        .route("/shapefile", get(handlers::shapefile))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let snapshot = MarketSnapshot::load(&args.snapshot).await?;
    info!(
        "loaded {} regions, {} dates from {}",
        snapshot.regions.len(),
        snapshot.dates().len(),
        args.snapshot.display()
    );

    let state = AppState {
        snapshot: Arc::new(snapshot),
        boundaries: Arc::new(BoundaryStore::new(&args.boundary_root, Arc::new(SystemClock))),
    };

    info!("market server listening on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
