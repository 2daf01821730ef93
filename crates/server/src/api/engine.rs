//! Engine API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use ptpilot_core::engine::{AutoDeletePolicy, JobIntervals};
use ptpilot_core::{EngineStatus, JobReport, SchedulePolicy};

use super::handlers::{engine_error, ApiError};
use crate::state::AppState;

/// Engine status: per-job bookkeeping, schedule window, config issues.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine().status())
}

/// Run a job now, ignoring the schedule gate.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(job): Path<String>,
) -> Result<Json<JobReport>, ApiError> {
    state
        .engine()
        .run_job_named(&job)
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn get_intervals(State(state): State<Arc<AppState>>) -> Json<JobIntervals> {
    Json(state.engine().intervals())
}

/// Replace the loop periods.
pub async fn set_intervals(
    State(state): State<Arc<AppState>>,
    Json(intervals): Json<JobIntervals>,
) -> Result<Json<JobIntervals>, ApiError> {
    state
        .engine()
        .set_intervals(intervals)
        .map_err(engine_error)?;
    Ok(Json(state.engine().intervals()))
}

pub async fn get_auto_delete(State(state): State<Arc<AppState>>) -> Json<AutoDeletePolicy> {
    Json(state.engine().auto_delete_policy())
}

/// Replace the auto-delete policy. Takes effect on the next job run.
pub async fn set_auto_delete(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<AutoDeletePolicy>,
) -> Result<Json<AutoDeletePolicy>, ApiError> {
    state
        .engine()
        .set_auto_delete_policy(policy)
        .map_err(engine_error)?;
    Ok(Json(state.engine().auto_delete_policy()))
}

pub async fn get_schedule(State(state): State<Arc<AppState>>) -> Json<SchedulePolicy> {
    Json(state.engine().schedule_policy())
}

/// Replace the schedule policy. Takes effect on the next gate check.
pub async fn set_schedule(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<SchedulePolicy>,
) -> Result<Json<SchedulePolicy>, ApiError> {
    state
        .engine()
        .set_schedule_policy(policy)
        .map_err(engine_error)?;
    Ok(Json(state.engine().schedule_policy()))
}
