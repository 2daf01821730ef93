use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use ptpilot_core::{EngineError, SanitizedConfig, StoreError};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn store_error(e: StoreError) -> ApiError {
    let status = match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        StoreError::InvalidTransition { .. } | StoreError::HashConflict { .. } => {
            StatusCode::CONFLICT
        }
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

pub fn engine_error(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::UnknownJob(_) | EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyRunning(_) => StatusCode::CONFLICT,
        EngineError::InvalidInput(_) | EngineError::TorrentMeta(_) => StatusCode::BAD_REQUEST,
        EngineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Downloader(_) | EngineError::Tracker(_) => StatusCode::BAD_GATEWAY,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match e {
        EngineError::Store(inner) => store_error(inner),
        other => api_error(status, other.to_string()),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        encode_metrics(),
    )
}
