//! HTTP route handlers for coverage API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::postal::{CarrierId, PostalCode, PostalCodeError, RegionKey};
use crate::region::{BoundaryRecord, MatchBasis};
use crate::server::AppState;

use super::types::{
    CarrierRegionCoverage, CarrierSummary, DiagnosticView, LookupError, RegionGeometry,
    RegionSummary,
};

/// Error response for coverage API
#[derive(Debug, Serialize)]
pub struct CoverageErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<LookupError> for CoverageErrorResponse {
    fn from(e: LookupError) -> Self {
        Self {
            error: e.to_string(),
            code: e.code().to_string(),
        }
    }
}

impl From<PostalCodeError> for CoverageErrorResponse {
    fn from(e: PostalCodeError) -> Self {
        Self {
            error: e.to_string(),
            code: "invalid_postal_code".to_string(),
        }
    }
}

impl IntoResponse for CoverageErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "invalid_postal_code" => StatusCode::BAD_REQUEST,
            "code_unresolved" | "code_not_in_shard" | "unknown_carrier" => StatusCode::NOT_FOUND,
            "shard_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Result embedded in a larger response, tagged by `status`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome<T> {
    Ok(T),
    Error(CoverageErrorResponse),
}

impl<T, U: From<T>> From<Result<T, LookupError>> for QueryOutcome<U> {
    fn from(result: Result<T, LookupError>) -> Self {
        match result {
            Ok(value) => QueryOutcome::Ok(U::from(value)),
            Err(e) => QueryOutcome::Error(e.into()),
        }
    }
}

/// One postal-code boundary as GeoJSON
#[derive(Debug, Serialize)]
pub struct BoundaryResponse {
    pub code: PostalCode,
    /// `[x, y]` of the boundary centroid
    pub centroid: Option<[f64; 2]>,
    pub geometry: geojson::Geometry,
}

impl From<&BoundaryRecord> for BoundaryResponse {
    fn from(record: &BoundaryRecord) -> Self {
        Self {
            code: record.code.clone(),
            centroid: record.centroid.map(|p| [p.x(), p.y()]),
            geometry: geojson::Geometry::new(geojson::Value::from(&record.geometry)),
        }
    }
}

/// Response for GET /api/coverage/:code/geometry
#[derive(Debug, Serialize)]
pub struct GeometryResponse {
    pub region: RegionKey,
    #[serde(rename = "match")]
    pub basis: MatchBasis,
    /// False when the region was picked among several prefix candidates
    pub confident: bool,
    pub boundary: BoundaryResponse,
}

impl From<RegionGeometry> for GeometryResponse {
    fn from(found: RegionGeometry) -> Self {
        Self {
            confident: found.region.is_confident(),
            boundary: BoundaryResponse::from(&found.record),
            region: found.region.region,
            basis: found.region.basis,
        }
    }
}

/// Response for GET /api/carriers/:carrier/regions/:region
#[derive(Debug, Serialize)]
pub struct CarrierRegionResponse {
    pub carrier: CarrierId,
    pub region: RegionKey,
    pub total_count: usize,
    pub boundaries: Vec<BoundaryResponse>,
}

impl From<CarrierRegionCoverage> for CarrierRegionResponse {
    fn from(coverage: CarrierRegionCoverage) -> Self {
        Self {
            total_count: coverage.records.len(),
            boundaries: coverage.records.iter().map(BoundaryResponse::from).collect(),
            carrier: coverage.carrier,
            region: coverage.region,
        }
    }
}

/// Response for GET /api/coverage/:code/carriers
#[derive(Debug, Serialize)]
pub struct CarriersCoveringResponse {
    pub code: PostalCode,
    pub covered: bool,
    pub carriers: Vec<CarrierId>,
}

/// Selected-carrier part of the coverage report
#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub carrier: CarrierId,
    pub covers_code: bool,
    pub region_coverage: QueryOutcome<CarrierRegionResponse>,
}

/// Response for GET /api/coverage/:code
#[derive(Debug, Serialize)]
pub struct CoverageReportResponse {
    pub code: PostalCode,
    pub carriers: Vec<CarrierId>,
    pub geometry: QueryOutcome<GeometryResponse>,
    pub selection: Option<SelectionResponse>,
}

/// Query parameters for the coverage report
#[derive(Debug, Deserialize)]
pub struct ReportQueryParams {
    pub carrier: Option<String>,
}

fn parse_code(raw: &str) -> Result<PostalCode, CoverageErrorResponse> {
    PostalCode::parse(raw).map_err(|e| {
        tracing::debug!("Rejecting postal code {:?}: {}", raw, e);
        CoverageErrorResponse::from(e)
    })
}

/// GET /api/carriers - List loaded carriers
pub async fn list_carriers(State(state): State<AppState>) -> Json<Vec<CarrierSummary>> {
    Json(state.coverage.carriers())
}

/// GET /api/regions - List known regions
pub async fn list_regions(State(state): State<AppState>) -> Json<Vec<RegionSummary>> {
    Json(state.coverage.regions())
}

/// GET /api/diagnostics - List sources excluded at startup
pub async fn list_diagnostics(State(state): State<AppState>) -> Json<Vec<DiagnosticView>> {
    Json(state.coverage.diagnostics())
}

/// GET /api/coverage/:code - Combined report, optionally for one carrier
pub async fn get_coverage_report(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(params): Query<ReportQueryParams>,
) -> Result<Json<CoverageReportResponse>, CoverageErrorResponse> {
    let code = parse_code(&raw)?;
    let carrier = params
        .carrier
        .filter(|c| !c.trim().is_empty())
        .map(CarrierId::new);

    let report = state
        .coverage
        .coverage_report(&code, carrier.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!("Coverage report for {} failed: {}", code, e);
            CoverageErrorResponse::from(e)
        })?;

    Ok(Json(CoverageReportResponse {
        code: report.code,
        carriers: report.carriers.into_iter().collect(),
        geometry: report.geometry.into(),
        selection: report.selection.map(|s| SelectionResponse {
            carrier: s.carrier,
            covers_code: s.covers_code,
            region_coverage: s.region_coverage.into(),
        }),
    }))
}

/// GET /api/coverage/:code/carriers - Carriers covering a postal code
pub async fn get_carriers_covering(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<CarriersCoveringResponse>, CoverageErrorResponse> {
    let code = parse_code(&raw)?;
    let carriers: Vec<CarrierId> = state.coverage.carriers_covering(&code).into_iter().collect();

    Ok(Json(CarriersCoveringResponse {
        code,
        covered: !carriers.is_empty(),
        carriers,
    }))
}

/// GET /api/coverage/:code/geometry - Boundary of a postal code
pub async fn get_region_geometry(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<GeometryResponse>, CoverageErrorResponse> {
    let code = parse_code(&raw)?;
    let found = state
        .coverage
        .region_geometry_for(&code)
        .await
        .map_err(CoverageErrorResponse::from)?;

    Ok(Json(found.into()))
}

/// GET /api/carriers/:carrier/regions/:region - A carrier's boundaries in one region
pub async fn get_carrier_coverage_in_region(
    State(state): State<AppState>,
    Path((carrier, region)): Path<(String, String)>,
) -> Result<Json<CarrierRegionResponse>, CoverageErrorResponse> {
    let carrier = CarrierId::new(carrier);
    let region = RegionKey::new(region);

    let coverage = state
        .coverage
        .carrier_coverage_in_region(&carrier, &region)
        .await
        .map_err(|e| {
            tracing::warn!(
                "Coverage of '{}' in region '{}' failed: {}",
                carrier,
                region,
                e
            );
            CoverageErrorResponse::from(e)
        })?;

    tracing::debug!(
        "Carrier '{}' covers {} boundaries in region '{}'",
        carrier,
        coverage.records.len(),
        region
    );

    Ok(Json(coverage.into()))
}

/// Coverage API routes, to be nested under `/api`
pub fn coverage_routes() -> Router<AppState> {
    Router::new()
        .route("/carriers", get(list_carriers))
        .route(
            "/carriers/:carrier/regions/:region",
            get(get_carrier_coverage_in_region),
        )
        .route("/regions", get(list_regions))
        .route("/diagnostics", get(list_diagnostics))
        .route("/coverage/:code", get(get_coverage_report))
        .route("/coverage/:code/carriers", get(get_carriers_covering))
        .route("/coverage/:code/geometry", get(get_region_geometry))
}
