//! HTTP facade over the [`QueryOrchestrator`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Welcome message |
//! | `GET`  | `/health` | Liveness (returns version and chat model) |
//! | `POST` | `/chat` | `{session_id, query}` → streamed `text/plain` answer |
//! | `POST` | `/chat/json` | `{session_id, query}` → `{answer}` |
//! | `POST` | `/reindex` | Rebuild the index if documents changed → `{rebuilt}` |
//!
//! Request bodies may carry extra fields (the front end sends `user_info`);
//! they are ignored.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `processing_error` (500). A streamed
//! answer that fails after the first fragment cannot change its status; the
//! body is cut short instead.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the portfolio front end
//! can call the API from any host.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::ChatError;
use crate::orchestrator::QueryOrchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<QueryOrchestrator>,
}

/// Builds the router. Split from [`run_server`] so tests can serve it on an
/// ephemeral port.
pub fn router(orchestrator: Arc<QueryOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat_stream))
        .route("/chat/json", post(handle_chat))
        .route("/reindex", post(handle_reindex))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

/// Binds `bind_addr` and serves until the process is terminated.
pub async fn run_server(bind_addr: &str, orchestrator: Arc<QueryOrchestrator>) -> anyhow::Result<()> {
    let app = router(orchestrator);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "chat server listening");
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

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::BadRequest(message) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message,
            },
            other => {
                error!(error = %other, "chat request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "processing_error",
                    message: other.to_string(),
                }
            }
        }
    }
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct WelcomeResponse {
    message: &'static str,
}

async fn handle_root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the portfolio chat API",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.orchestrator.chat_model().to_string(),
    })
}

// ============ POST /chat/json ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: String,
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let answer = state
        .orchestrator
        .answer(&req.session_id, &req.query)
        .await?;
    Ok(Json(ChatResponse { answer }))
}

// ============ POST /chat ============

/// Streams the answer as UTF-8 text fragments. Errors before the first
/// fragment produce the usual JSON error; later ones abort the body.
async fn handle_chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let fragments = state
        .orchestrator
        .answer_stream(&req.session_id, &req.query)
        .await?;

    let body = Body::from_stream(fragments.map(|fragment| {
        fragment.map_err(|e| {
            error!(error = %e, "aborting streamed answer");
            std::io::Error::other(e.to_string())
        })
    }));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

// ============ POST /reindex ============

#[derive(Serialize)]
struct ReindexResponse {
    rebuilt: bool,
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, AppError> {
    let rebuilt = state
        .orchestrator
        .reindex()
        .await
        .map_err(ChatError::into_processing)?;
    Ok(Json(ReindexResponse { rebuilt }))
}
