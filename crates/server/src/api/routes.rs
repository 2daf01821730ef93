use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{directory, engine, handlers, middleware::metrics_middleware, records};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Engine
        .route("/engine/status", get(engine::get_status))
        .route(
            "/engine/intervals",
            get(engine::get_intervals).put(engine::set_intervals),
        )
        .route(
            "/engine/policies/auto-delete",
            get(engine::get_auto_delete).put(engine::set_auto_delete),
        )
        .route(
            "/engine/policies/schedule",
            get(engine::get_schedule).put(engine::set_schedule),
        )
        .route("/engine/jobs/{job}/run", post(engine::run_job))
        // Records
        .route("/records", get(records::list_records))
        .route("/records/import", post(records::import_record))
        .route(
            "/records/{id}",
            get(records::get_record).delete(records::delete_record),
        )
        // Directory
        .route(
            "/accounts",
            get(directory::list_accounts).post(directory::create_account),
        )
        .route("/rules", get(directory::list_rules).post(directory::create_rule))
        .route(
            "/backends",
            get(directory::list_backends).post(directory::create_backend),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
