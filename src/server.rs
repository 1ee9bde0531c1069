//! HTTP question-answering server.
//!
//! Exposes [`QaPipeline::answer`] as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question |
//! | `GET`  | `/health` | Health check (returns version and index size) |
//!
//! ```json
//! // POST /query
//! { "question": "What is the offside rule?" }
//! // 200
//! { "answer": "...", "sources": ["laws.pdf", "laws.pdf"] }
//! ```
//!
//! `texto` is accepted as an alias for `question`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid query: question is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400, also for malformed request bodies),
//! `embedding_failed` (502), `model_failed` (502), `internal` (500).
//!
//! # Startup
//!
//! The index is loaded and validated once; the server refuses to start if it
//! is missing, corrupt, or was built with a different embedding model.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::index::SqliteIndex;
use crate::llm::create_chat_model;
use crate::pipeline::{QaPipeline, QaSettings};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<QaPipeline>,
}

/// Build a [`QaPipeline`] over the persisted index described by `config`.
///
/// Fails if the index is unavailable or the configured embedder does not
/// match the one that built it.
pub async fn build_pipeline(config: &Config) -> anyhow::Result<QaPipeline> {
    let index = Arc::new(SqliteIndex::open(&config.index.path).await?);
    let embedder = create_embedder(&config.embedding)?;
    let model = create_chat_model(&config.model)?;

    Ok(QaPipeline::builder()
        .settings(QaSettings::from_config(config))
        .embedder(embedder)
        .index(index)
        .model(model)
        .build()?)
}

/// Routes for a ready pipeline.
pub fn router(pipeline: Arc<QaPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(build_pipeline(config).await?);
    let app = router(pipeline);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("RAG server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::EmbeddingFailure(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            RagError::ModelInvocationFailure(_) => (StatusCode::BAD_GATEWAY, "model_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %err, code, "query failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: rejection.body_text(),
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

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.pipeline.index().len(),
    })
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(alias = "texto")]
    question: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = request?;
    let answer = state.pipeline.answer(&request.question).await?;
    Ok(Json(QueryResponse {
        answer: answer.text,
        sources: answer.sources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let e = AppError::from(RagError::InvalidQuery("question is empty".to_string()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e = AppError::from(RagError::EmbeddingFailure("down".to_string()));
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "embedding_failed");

        let e = AppError::from(RagError::ModelInvocationFailure("timeout".to_string()));
        assert_eq!(e.code, "model_failed");

        let e = AppError::from(RagError::Storage("disk".to_string()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, "internal");
    }

    #[test]
    fn test_request_accepts_alias() {
        let r: QueryRequest = serde_json::from_str(r#"{"texto": "¿Qué es offside?"}"#).unwrap();
        assert_eq!(r.question, "¿Qué es offside?");
        let r: QueryRequest = serde_json::from_str(r#"{"question": "What is offside?"}"#).unwrap();
        assert_eq!(r.question, "What is offside?");
    }
}
