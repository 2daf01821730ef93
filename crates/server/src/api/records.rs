//! Acquisition record API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ptpilot_core::engine::ManualImport;
use ptpilot_core::{AcquisitionRecord, RecordFilter, RecordState};

use super::handlers::{api_error, engine_error, store_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for record queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for record queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing records
#[derive(Debug, Deserialize)]
pub struct ListRecordsParams {
    /// Filter by lifecycle state
    pub state: Option<String>,
    pub backend_id: Option<String>,
    pub account_id: Option<String>,
    pub rule_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing records
#[derive(Debug, Serialize)]
pub struct ListRecordsResponse {
    pub records: Vec<AcquisitionRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Also remove downloaded data. Defaults to true.
    pub purge: Option<bool>,
}

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRecordsParams>,
) -> Result<Json<ListRecordsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = RecordFilter::new();
    if let Some(ref raw) = params.state {
        let record_state = RecordState::parse(raw).ok_or_else(|| {
            api_error(StatusCode::BAD_REQUEST, format!("unknown state: {}", raw))
        })?;
        filter = filter.with_state(record_state);
    }
    if let Some(ref backend_id) = params.backend_id {
        filter = filter.with_backend(backend_id);
    }
    if let Some(ref account_id) = params.account_id {
        filter = filter.with_account(account_id);
    }
    if let Some(ref rule_id) = params.rule_id {
        filter = filter.with_rule(rule_id);
    }

    let total = state.lifecycle().count(&filter).map_err(store_error)?;
    let records = state
        .lifecycle()
        .list(&filter.with_limit(limit).with_offset(offset))
        .map_err(store_error)?;

    Ok(Json(ListRecordsResponse {
        records,
        total,
        limit,
        offset,
    }))
}

pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AcquisitionRecord>, ApiError> {
    match state.lifecycle().get(&id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Record not found: {}", id),
        )),
        Err(e) => Err(store_error(e)),
    }
}

/// Operator delete: remove from the backend and mark `deleted`.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<AcquisitionRecord>, ApiError> {
    state
        .engine()
        .delete_record(&id, params.purge.unwrap_or(true))
        .await
        .map(Json)
        .map_err(engine_error)
}

/// Import a base64 `.torrent`, optionally pushing it to a backend.
pub async fn import_record(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ManualImport>,
) -> Result<(StatusCode, Json<AcquisitionRecord>), ApiError> {
    state
        .engine()
        .import(body)
        .await
        .map(|record| (StatusCode::CREATED, Json(record)))
        .map_err(engine_error)
}
