use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ForecastError;
use crate::forecast::calibration::{
    calibration_table, dashboard_stats, CalibrationPage, CalibrationQuery, DashboardStats,
    SortDirection, SortKey,
};
use crate::forecast::generator::{generate_for_pair, GenerationOutcome};
use crate::forecast::orchestrator::{BatchOrchestrator, RunStatus};
use crate::forecast::overrides::{apply_bulk_override, OverrideReport, OverrideRequest};
use crate::forecast::ForecastStore;
use crate::models::PairKey;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: ForecastStore,
    pub orchestrator: Arc<BatchOrchestrator>,
}

/// Create the API router
pub fn create_router(store: ForecastStore, orchestrator: Arc<BatchOrchestrator>) -> Router {
    let state = AppState {
        store,
        orchestrator,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/forecasts/bulk-trigger", post(trigger_bulk))
        .route("/api/forecasts/generate", post(generate_single))
        .route("/api/forecasts/batch-generate", post(batch_generate))
        .route("/api/forecasts/bulk-override", post(bulk_override))
        .route("/api/forecasts/run-status", get(run_status))
        .route("/api/forecasts/calibration-table/:market_id", get(calibration))
        .route("/api/forecasts/dashboard-stats", get(dashboard))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Kick off a full batch run over every active pair. Fire-and-forget: the
/// response acknowledges dispatch, progress is polled via /run-status.
async fn trigger_bulk(
    State(state): State<AppState>,
    Query(params): Query<TriggerQuery>,
) -> impl IntoResponse {
    let as_of = Utc::now().date_naive();
    let force = params.force.unwrap_or(false);
    let run_id = state.orchestrator.trigger(as_of, force);

    info!("Bulk forecast run triggered via API, run {}", run_id);
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            run_id,
            status: "STARTED",
            triggered_at: Utc::now(),
        }),
    )
}

/// Synchronous single-pair regeneration for on-demand recompute.
async fn generate_single(
    State(state): State<AppState>,
    Query(params): Query<PairQuery>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let pair = PairKey::new(params.product_id, params.market_id);
    let as_of = Utc::now().date_naive();
    let force = params.force.unwrap_or(false);

    match generate_for_pair(&state.store, pair, as_of, force) {
        Ok(outcome) => Ok(Json(GenerateResponse {
            status: "SUCCESS",
            product_id: pair.product_id,
            market_id: pair.market_id,
            message: None,
            outcome: Some(outcome),
        })),
        // Thin history is an expected outcome, not a request failure
        Err(err) if err.is_skip() => Ok(Json(GenerateResponse {
            status: "SKIPPED",
            product_id: pair.product_id,
            market_id: pair.market_id,
            message: Some(err.to_string()),
            outcome: None,
        })),
        Err(err) => Err(err.into()),
    }
}

/// Regenerate an explicit list of pairs in the background. Pairs are
/// processed independently; per-pair outcomes go to the logs.
async fn batch_generate(
    State(state): State<AppState>,
    Json(pairs): Json<Vec<PairKey>>,
) -> Result<impl IntoResponse, ApiError> {
    if pairs.is_empty() {
        return Err(ApiError::BadRequest("no pairs in request body".to_string()));
    }

    let total_pairs = pairs.len();
    let as_of = Utc::now().date_naive();
    let store = state.store.clone();

    let spawned = std::thread::Builder::new()
        .name("forecast-batch-gen".to_string())
        .spawn(move || {
            let mut succeeded = 0usize;
            let mut skipped = 0usize;
            let mut failed = 0usize;
            for pair in pairs {
                match generate_for_pair(&store, pair, as_of, false) {
                    Ok(_) => succeeded += 1,
                    Err(e) if e.is_skip() => skipped += 1,
                    Err(e) => {
                        error!("Batch generate failed for {}: {}", pair, e);
                        failed += 1;
                    }
                }
            }
            info!(
                "✅ Batch generate finished: {} ok, {} skipped, {} failed",
                succeeded, skipped, failed
            );
        });

    if let Err(e) = spawned {
        error!("Could not dispatch batch generate: {}", e);
        return Err(ApiError::Internal(ForecastError::SystemFailure(
            e.to_string(),
        )));
    }

    info!("Batch generate triggered for {} pairs", total_pairs);
    Ok((
        StatusCode::ACCEPTED,
        Json(BatchGenerateResponse {
            status: "STARTED",
            total_pairs,
            triggered_at: Utc::now(),
        }),
    ))
}

/// Apply a manual override request; per-pair outcomes in the response.
async fn bulk_override(
    State(state): State<AppState>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<OverrideReport>, ApiError> {
    let as_of = Utc::now().date_naive();
    let report = apply_bulk_override(&state.store, &request, as_of)?;
    Ok(Json(report))
}

/// Latest batch run's aggregate counters.
async fn run_status(State(state): State<AppState>) -> Result<Json<RunStatus>, ApiError> {
    state
        .orchestrator
        .current_status()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no batch run dispatched yet".to_string()))
}

/// Paged calibration table for one market.
async fn calibration(
    State(state): State<AppState>,
    Path(market_id): Path<i64>,
    Query(params): Query<CalibrationParams>,
) -> Result<Json<CalibrationPage>, ApiError> {
    let query = params.into_query()?;
    let as_of = Utc::now().date_naive();

    calibration_table(&state.store, market_id, &query, as_of)
        .map(Json)
        .map_err(|err| match err {
            ForecastError::InvalidTarget(msg) => ApiError::NotFound(msg),
            other => other.into(),
        })
}

/// Stat cards for the dashboard header.
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    let as_of = Utc::now().date_naive();
    let stats = dashboard_stats(&state.store, as_of)?;
    Ok(Json(stats))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct TriggerQuery {
    /// Regenerate pinned rows too
    force: Option<bool>,
}

#[derive(Deserialize)]
struct PairQuery {
    product_id: i64,
    market_id: i64,
    force: Option<bool>,
}

#[derive(Deserialize)]
struct CalibrationParams {
    page: Option<usize>,
    size: Option<usize>,
    sort_by: Option<String>,
    sort_direction: Option<String>,
}

impl CalibrationParams {
    fn into_query(self) -> Result<CalibrationQuery, ApiError> {
        let defaults = CalibrationQuery::default();
        let sort_by = match self.sort_by.as_deref() {
            None => defaults.sort_by,
            Some(raw) => SortKey::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown sort key '{raw}'")))?,
        };
        let sort_direction = match self.sort_direction.as_deref() {
            None => defaults.sort_direction,
            Some(raw) => SortDirection::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown sort direction '{raw}'")))?,
        };
        Ok(CalibrationQuery {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
            sort_by,
            sort_direction,
        })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct TriggerResponse {
    run_id: Uuid,
    status: &'static str,
    triggered_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BatchGenerateResponse {
    status: &'static str,
    total_pairs: usize,
    triggered_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct GenerateResponse {
    status: &'static str,
    product_id: i64,
    market_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<GenerationOutcome>,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Internal(ForecastError),
    NotFound(String),
    BadRequest(String),
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::InvalidTarget(msg) | ForecastError::ParseFailure(msg) => {
                ApiError::BadRequest(msg)
            }
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
