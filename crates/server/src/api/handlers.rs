use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use corral_core::{Config, CorralError, OrchestratorStatus};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Maximum allowed limit for list queries
pub const MAX_LIMIT: i64 = 1000;

/// Default limit for list queries
pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an engine error to its HTTP status.
pub fn api_error(err: CorralError) -> ApiError {
    let status = match &err {
        CorralError::Validation(_) => StatusCode::BAD_REQUEST,
        CorralError::NotFound { .. } => StatusCode::NOT_FOUND,
        CorralError::InvalidState(_) => StatusCode::CONFLICT,
        CorralError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        _ => {
            error!("Request failed: {}", err.detail());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status())
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Config> {
    Json(state.config().clone())
}

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
