//! HTTP routes

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ws::ws_handler;
use super::AppState;
use crate::execution::{ExecuteRequest, ExecuteResponse};
use crate::metrics;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub users: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/execute", post(execute))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        users: state.hub.connection_count().await,
    })
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected execute request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Failed to execute code")),
            )
                .into_response();
        }
    };

    if request.code.is_empty() || request.language.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing code or language")),
        )
            .into_response();
    }

    let response: ExecuteResponse = state.gateway.execute(&request.code, &request.language).await;
    (StatusCode::OK, Json(response)).into_response()
}

async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(format!("Failed to encode metrics: {e}"))),
        )
            .into_response(),
    }
}

async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found")))
}
