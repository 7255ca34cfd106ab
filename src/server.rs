//! JSON HTTP API for document ingestion and clause risk analysis.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ingest` | Upload a document (multipart `file` field) |
//! | `POST` | `/api/analyze` | Analyze indexed clauses against a query |
//! | `GET`  | `/api/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses use one schema:
//!
//! ```json
//! { "status": "error", "detail": "query must not be empty" }
//! ```
//!
//! Unsupported or undecodable uploads and bad requests return 400;
//! everything else returns 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! front-ends served from a different origin.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::index::SemanticIndex;
use crate::ingest::ingest_document;
use crate::loader::LoadError;
use crate::models::OverallReport;
use crate::pipeline::AnalysisPipeline;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    index: Arc<dyn SemanticIndex>,
    pipeline: Arc<AnalysisPipeline>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(
    config: &Config,
    index: Arc<dyn SemanticIndex>,
    pipeline: Arc<AnalysisPipeline>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState { index, pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/ingest", post(handle_ingest))
        .route("/api/analyze", post(handle_analyze))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    status: String,
    detail: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error".to_string(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

fn internal_error(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.into(),
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct IngestResponse {
    status: String,
    filename: String,
    num_clauses: usize,
    message: String,
}

/// `POST /api/ingest` — accepts a multipart upload with a `file` field,
/// segments it, and replaces the index contents.
async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| bad_request("file field must carry a filename"))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| bad_request("multipart field 'file' is required"))?;

    let summary = ingest_document(state.index.clone(), &bytes, &filename)
        .await
        .map_err(map_ingest_error)?;

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        filename: summary.filename,
        num_clauses: summary.num_clauses,
        message: format!("Indexed {} clause segment(s)", summary.num_clauses),
    }))
}

/// Client-side load failures (unsupported format, undecodable bytes)
/// are the caller's fault; anything else is ours.
fn map_ingest_error(e: anyhow::Error) -> AppError {
    match e.downcast_ref::<LoadError>() {
        Some(_) => bad_request(e.to_string()),
        None => internal_error(e.to_string()),
    }
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    query: String,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    status: String,
    answer: String,
    overall_report: Option<OverallReport>,
    num_clauses_analyzed: usize,
}

/// `POST /api/analyze` — runs the full retrieve/score/summarize pipeline
/// for one query against the currently indexed document.
async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let report = state
        .pipeline
        .run(&request.query)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    Ok(Json(AnalyzeResponse {
        status: "success".to_string(),
        answer: report.final_answer,
        overall_report: report.overall_report,
        num_clauses_analyzed: report.risk_analysis.len(),
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// `GET /api/health` — liveness check.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
