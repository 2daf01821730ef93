//! Accounts, rules and backends.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use ptpilot_core::directory::{NewAccount, NewBackend, NewRule};
use ptpilot_core::{Account, Backend, Rule};

use super::handlers::{store_error, ApiError};
use crate::state::AppState;

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Account>>, ApiError> {
    state
        .directory()
        .list_accounts()
        .map(Json)
        .map_err(store_error)
}

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    state
        .directory()
        .create_account(body)
        .map(|account| (StatusCode::CREATED, Json(account)))
        .map_err(store_error)
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Rule>>, ApiError> {
    state.directory().list_rules().map(Json).map_err(store_error)
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewRule>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    state
        .directory()
        .create_rule(body)
        .map(|rule| (StatusCode::CREATED, Json(rule)))
        .map_err(store_error)
}

pub async fn list_backends(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Backend>>, ApiError> {
    state
        .directory()
        .list_backends()
        .map(Json)
        .map_err(store_error)
}

pub async fn create_backend(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBackend>,
) -> Result<(StatusCode, Json<Backend>), ApiError> {
    state
        .directory()
        .create_backend(body)
        .map(|backend| (StatusCode::CREATED, Json(backend)))
        .map_err(store_error)
}
