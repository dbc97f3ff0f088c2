//! Dashboard HTTP API.
//!
//! A JSON API over the pipeline and its run history, meant to back a
//! dashboard front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/runs?limit=N` | Recent runs, newest first |
//! | `GET`  | `/runs/{id}` | One run with its stage outputs |
//! | `POST` | `/runs` | Start a run and wait for it to finish |
//!
//! `POST /runs` takes `{ "company": "...", "audience": "...", "follow_up": "..." }`.
//! With a `follow_up` only the research stage runs.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "company must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `stage_failed` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser dashboard can
//! be served from anywhere.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agents::ResearchRequest;
use crate::history::{
    check_list_limit, HistoryStore, RunDetail, RunSummary, DEFAULT_LIST_LIMIT,
};
use crate::pipeline::{Pipeline, PipelineError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history: HistoryStore,
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/runs", get(handle_list_runs).post(handle_create_run))
        .route("/runs/{id}", get(handle_get_run))
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = bind_addr, "dashboard API listening");
    println!("adsmith API listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "stage_failed",
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /runs ============

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct RunListResponse {
    runs: Vec<RunSummary>,
}

async fn handle_list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RunListResponse>, AppError> {
    let limit = check_list_limit(params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .map_err(|e| bad_request(e.to_string()))?;
    let runs = state.history.list_runs(limit).await.map_err(internal)?;
    Ok(Json(RunListResponse { runs }))
}

// ============ GET /runs/{id} ============

async fn handle_get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetail>, AppError> {
    match state.history.get_run(&id).await.map_err(internal)? {
        Some(run) => Ok(Json(run)),
        None => Err(not_found(format!("run not found: {}", id))),
    }
}

// ============ POST /runs ============

#[derive(Deserialize)]
struct CreateRunRequest {
    company: String,
    #[serde(default)]
    audience: Option<String>,
    #[serde(default)]
    follow_up: Option<String>,
}

async fn handle_create_run(
    State(state): State<AppState>,
    Json(body): Json<CreateRunRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let company = body.company.trim();
    if company.is_empty() {
        return Err(bad_request("company must not be empty"));
    }

    let mut request = ResearchRequest::new(company);
    if let Some(audience) = body.audience.filter(|a| !a.trim().is_empty()) {
        request = request.with_audience(audience);
    }
    let follow_up = body.follow_up.filter(|f| !f.trim().is_empty());

    let value = match follow_up {
        Some(question) => {
            let outcome = state
                .pipeline
                .research_only(&request.with_follow_up(question))
                .await?;
            serde_json::to_value(outcome)
        }
        None => serde_json::to_value(state.pipeline.run(&request).await?),
    }
    .map_err(|e| internal(e.into()))?;

    Ok(Json(value))
}
