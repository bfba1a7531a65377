//! API Service - Read-only crop harvest-area API for the dashboard
//!
//! Endpoints:
//! - GET  /health - Health check
//! - GET  /api/crops - Sorted crop names
//! - GET  /api/crop-data/:crop_name - Per-municipality data for one crop
//! - GET  /api/crop-map-data/:crop_name - Same, restricted to 7-digit IBGE codes
//! - GET  /api/crop-chart-data/:crop_name - Top 20 municipalities by area
//! - GET  /api/municipalities/:code - Every crop reported by one municipality
//! - GET  /api/statistics - Totals and last update
//! - GET  /api/states - Brazilian states
//! - POST /api/reload - Rebuild the in-memory index from its source

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use harvest_core::index::MunicipalityProfile;
use harvest_core::service::Statistics;
use harvest_core::sources::{FileSource, PgSource};
use harvest_core::states::{State as BrazilianState, BRAZILIAN_STATES};
use harvest_core::store::ensure_schema;
use harvest_core::{CropData, CropService, QueryError};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// State
// ============================================================================

struct AppState {
    service: CropService,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum DataSource {
    File(PathBuf),
    Db(String),
}

#[derive(Debug, Clone)]
struct Config {
    bind: String,
    data_source: DataSource,
    static_dir: Option<PathBuf>,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let data_source = match get("DATA_SOURCE").as_deref().unwrap_or("file") {
            "file" => DataSource::File(PathBuf::from(
                get("DATA_FILE").unwrap_or_else(|| "data/crop_data_static.json".to_string()),
            )),
            "db" => DataSource::Db(get("DB_URL").context("DB_URL env var missing")?),
            other => anyhow::bail!("DATA_SOURCE must be 'file' or 'db', got '{}'", other),
        };

        Ok(Self {
            bind: get("API_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            data_source,
            static_dir: get("STATIC_DIR").map(PathBuf::from),
        })
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct CropsResponse {
    success: bool,
    crops: Vec<String>,
}

#[derive(Serialize)]
struct CropDataResponse {
    success: bool,
    crop_name: String,
    total_municipalities: usize,
    data: CropData,
}

#[derive(Serialize)]
struct ChartPayload {
    labels: Vec<String>,
    data: Vec<f64>,
    crop_name: String,
}

#[derive(Serialize)]
struct ChartResponse {
    success: bool,
    chart_data: ChartPayload,
}

#[derive(Serialize)]
struct MunicipalityResponse {
    success: bool,
    municipality_code: String,
    municipality: MunicipalityProfile,
}

#[derive(Serialize)]
struct StatisticsResponse {
    success: bool,
    statistics: Statistics,
}

#[derive(Serialize)]
struct StatesResponse {
    success: bool,
    states: &'static [BrazilianState],
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    crops: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

fn not_found(e: QueryError) -> Response {
    error_response(StatusCode::NOT_FOUND, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn crops_handler(State(state): State<Arc<AppState>>) -> Json<CropsResponse> {
    Json(CropsResponse {
        success: true,
        crops: state.service.list_crops(),
    })
}

async fn crop_data_handler(
    State(state): State<Arc<AppState>>,
    Path(crop_name): Path<String>,
) -> Response {
    match state.service.get_crop_data(&crop_name) {
        Ok(data) => Json(CropDataResponse {
            success: true,
            total_municipalities: data.len(),
            crop_name,
            data,
        })
        .into_response(),
        Err(e) => not_found(e),
    }
}

async fn crop_map_data_handler(
    State(state): State<Arc<AppState>>,
    Path(crop_name): Path<String>,
) -> Response {
    match state.service.get_map_data(&crop_name) {
        Ok(data) => Json(CropDataResponse {
            success: true,
            total_municipalities: data.len(),
            crop_name,
            data,
        })
        .into_response(),
        Err(e) => not_found(e),
    }
}

async fn crop_chart_handler(
    State(state): State<Arc<AppState>>,
    Path(crop_name): Path<String>,
) -> Response {
    match state.service.get_chart_data(&crop_name) {
        Ok(chart) => Json(ChartResponse {
            success: true,
            chart_data: ChartPayload {
                labels: chart.labels,
                data: chart.values,
                crop_name,
            },
        })
        .into_response(),
        Err(e) => not_found(e),
    }
}

async fn municipality_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.service.get_municipality(&code) {
        Ok(municipality) => Json(MunicipalityResponse {
            success: true,
            municipality_code: harvest_core::locality::normalize_municipality_code(Some(&code)),
            municipality,
        })
        .into_response(),
        Err(e) => not_found(e),
    }
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> Json<StatisticsResponse> {
    Json(StatisticsResponse {
        success: true,
        statistics: state.service.get_statistics(),
    })
}

async fn states_handler() -> Json<StatesResponse> {
    Json(StatesResponse {
        success: true,
        states: &BRAZILIAN_STATES,
    })
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.service.reload().await {
        Ok(()) => Json(ReloadResponse {
            success: true,
            crops: state.service.snapshot().crops.len(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "reload request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    // CORS for the dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/crops", get(crops_handler))
        .route("/api/crop-data/:crop_name", get(crop_data_handler))
        .route("/api/crop-map-data/:crop_name", get(crop_map_data_handler))
        .route("/api/crop-chart-data/:crop_name", get(crop_chart_handler))
        .route("/api/municipalities/:code", get(municipality_handler))
        .route("/api/statistics", get(statistics_handler))
        .route("/api/states", get(states_handler))
        .route("/api/reload", post(reload_handler))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(bind = %config.bind, source = ?config.data_source, "starting crop API");

    let service = match &config.data_source {
        DataSource::File(path) => CropService::open(FileSource::new(path))
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?,
        DataSource::Db(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(db_url)
                .await
                .context("Failed to connect to database")?;
            ensure_schema(&pool).await.context("Failed to create schema")?;
            info!("database connected");
            CropService::open(PgSource::new(pool))
                .await
                .context("Failed to load crop data from database")?
        }
    };

    let state = Arc::new(AppState { service });
    let mut router = app(state);

    match &config.static_dir {
        Some(dir) if dir.is_dir() => {
            info!(dir = %dir.display(), "serving dashboard");
            router = router.fallback_service(ServeDir::new(dir));
        }
        Some(dir) => warn!(dir = %dir.display(), "STATIC_DIR is not a directory, dashboard disabled"),
        None => {}
    }

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("API listening on http://{}", config.bind);
    axum::serve(listener, router).await?;

    Ok(())
}
