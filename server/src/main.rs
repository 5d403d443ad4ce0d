use axum::{Router, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use postal_coverage_server::config::Config;
use postal_coverage_server::resolver::CoverageService;
use postal_coverage_server::{AppState, CoverageResolver, app_router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Warn early about a data directory that is missing or empty
fn check_directory(path: &Path, name: &str) {
    match path.read_dir() {
        Ok(mut entries) => {
            if entries.next().is_none() {
                warn!("{} directory {:?} is empty", name, path);
            }
        }
        Err(e) => warn!("{} directory {:?} is not readable: {}", name, path, e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postal_coverage=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: host={}, port={}, data_root={:?}",
        config.host, config.port, config.engine.data_root
    );
    if let Some(tolerance) = config.engine.simplify_tolerance {
        info!(
            "Boundary simplification enabled (tolerance {}); boundaries are approximate",
            tolerance
        );
    }

    check_directory(&config.engine.coverage_path(), "Coverage");
    check_directory(&config.engine.shards_path(), "Shards");

    // Ingest coverage tables and index boundary shards (blocking file I/O)
    let engine_config = config.engine.clone();
    let engine =
        tokio::task::spawn_blocking(move || CoverageResolver::from_config(&engine_config)).await?;

    for diagnostic in engine.diagnostics() {
        warn!(
            "Excluded {:?} ({}): {}",
            diagnostic.source, diagnostic.code, diagnostic.error
        );
    }
    let stats = engine.stats();
    info!(
        "Engine ready: {} carriers, {} postal codes, {} regions ({})",
        stats.carriers, stats.postal_codes, stats.regions, stats.region_strategy
    );

    let app_state = AppState::new(Arc::new(engine));

    let app: Router = app_router(app_state)
        .route("/metrics/prometheus", get(prometheus_metrics));

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Postal coverage server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
