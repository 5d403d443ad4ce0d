//! Shared application state and router assembly

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::resolver::{CoverageService, coverage_routes};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coverage: Arc<dyn CoverageService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(coverage: Arc<dyn CoverageService>) -> Self {
        Self {
            coverage,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub carriers: usize,
    pub regions: usize,
    pub uptime_seconds: u64,
}

/// GET /health - Healthy once at least one carrier and one region are available
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.coverage.stats();
    let ready = stats.carriers > 0 && stats.regions > 0;

    let (http_status, status) = if ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            carriers: stats.carriers,
            regions: stats.regions,
            uptime_seconds: state.uptime_seconds(),
        }),
    )
}

#[derive(Serialize)]
pub struct MetricsResponse {
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: &'static str,
    pub carriers_loaded: usize,
    pub postal_codes: usize,
    pub regions_known: usize,
    pub shards_loaded: usize,
    /// Boundary files parsed so far
    pub shard_parses: u64,
    pub diagnostics: usize,
    pub region_strategy: &'static str,
}

/// GET /metrics - JSON snapshot of engine counters
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let stats = state.coverage.stats();

    Json(MetricsResponse {
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
        carriers_loaded: stats.carriers,
        postal_codes: stats.postal_codes,
        regions_known: stats.regions,
        shards_loaded: stats.shards_loaded,
        shard_parses: stats.shard_parses,
        diagnostics: stats.diagnostics,
        region_strategy: stats.region_strategy,
    })
}

/// Build the application router: health, JSON metrics and the coverage API
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest("/api", coverage_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CompressionLayer::new())
}
