//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version and current index generation |
//! | `POST` | `/search` | Ranked search |
//! | `POST` | `/ai-search` | Access-scoped AI answer for the calling user |
//! | `POST` | `/admin/refresh` | Rebuild and publish a new index generation |
//!
//! The calling user of `/ai-search` is read from the header named by
//! `[server].user_header`, set by the authenticating proxy in front of
//! this server.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "threadId must be an integer, got 'x'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `internal` (500),
//! `malformed_model_output` (502), `upstream_error` (502),
//! `model_unavailable` (503), `timeout` (504).

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::AiAnswer;
use crate::config::Config;
use crate::error::SearchError;
use crate::search::{SearchQuery, SearchResponse};
use crate::service::{AiSearchRequest, RefreshReport, SearchService};

#[derive(Clone)]
struct AppState {
    service: Arc<SearchService>,
}

/// Open the configured database, build the index and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(SearchService::open(config.clone()).await?);
    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        bind = %bind_addr,
        model = service.model_name(),
        documents = service.stats().documents,
        "search server listening"
    );
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// All routes over `service`, with permissive CORS.
pub fn router(service: Arc<SearchService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/ai-search", post(handle_ai_search))
        .route("/admin/refresh", post(handle_refresh))
        .layer(cors)
        .with_state(AppState { service })
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

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let message = err.to_string();
        match err {
            SearchError::InvalidRequest(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            SearchError::ModelUnavailable(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "model_unavailable", message)
            }
            SearchError::MalformedModelOutput(_) => {
                tracing::warn!(error = %message, "model output rejected");
                AppError::new(StatusCode::BAD_GATEWAY, "malformed_model_output", message)
            }
            SearchError::ModelRequest(_) => {
                tracing::warn!(error = %message, "model request failed");
                AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
            SearchError::ModelTimeout(_) | SearchError::EnrichmentTimeout(_) => {
                AppError::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
            }
            SearchError::Store(e) => internal(e),
        }
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("{:#}", err))
}

fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    generation: u64,
    documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.service.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: stats.generation,
        documents: stats.documents,
    })
}

// ============ POST /search ============

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(query) = body.map_err(bad_json)?;
    Ok(Json(state.service.search(&query)))
}

// ============ POST /ai-search ============

/// Authenticated user id from the configured header.
fn caller_id(state: &AppState, headers: &HeaderMap) -> Result<i64, AppError> {
    let name = &state.service.config().server.user_header;
    let value = headers
        .get(name.as_str())
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                format!("missing {} header", name),
            )
        })?
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok());
    value.ok_or_else(|| {
        AppError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            format!("{} header must be a numeric user id", name),
        )
    })
}

async fn handle_ai_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AiSearchRequest>, JsonRejection>,
) -> Result<Json<AiAnswer>, AppError> {
    let user_id = caller_id(&state, &headers)?;
    let Json(request) = body.map_err(bad_json)?;
    let answer = state.service.ai_search(user_id, &request).await?;
    Ok(Json(answer))
}

// ============ POST /admin/refresh ============

async fn handle_refresh(State(state): State<AppState>) -> Result<Json<RefreshReport>, AppError> {
    let report = state.service.refresh().await.map_err(internal)?;
    Ok(Json(report))
}
