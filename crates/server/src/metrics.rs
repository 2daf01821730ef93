//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the ptpilot server:
//! - HTTP request metrics (latency, counts)
//! - Engine and record state (collected dynamically)
//! - Job, push and eviction metrics registered from the core

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use ptpilot_core::{RecordFilter, RecordState};
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ptpilot_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path", "status"],
    )
    .ok()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ptpilot_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .ok()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<Option<IntGauge>> = Lazy::new(|| {
    IntGauge::new(
        "ptpilot_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .ok()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Engine running state (1 = running, 0 = stopped).
pub static ENGINE_RUNNING: Lazy<Option<IntGauge>> = Lazy::new(|| {
    IntGauge::new(
        "ptpilot_engine_running",
        "Whether the job engine is running (1) or stopped (0)",
    )
    .ok()
});

/// Records by lifecycle state.
pub static RECORDS_BY_STATE: Lazy<Option<IntGaugeVec>> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("ptpilot_records_by_state", "Current record count by state"),
        &["state"],
    )
    .ok()
});

/// Outstanding configuration issues.
pub static CONFIG_ISSUES: Lazy<Option<IntGauge>> = Lazy::new(|| {
    IntGauge::new(
        "ptpilot_config_issues",
        "Rules or policies the engine could not act on",
    )
    .ok()
});

// =============================================================================
// Registration
// =============================================================================

fn register(registry: &Registry, collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = registry.register(collector) {
        warn!(error = %e, "failed to register metric");
    }
}

fn register_metrics(registry: &Registry) {
    // HTTP
    if let Some(m) = HTTP_REQUEST_DURATION.as_ref() {
        register(registry, Box::new(m.clone()));
    }
    if let Some(m) = HTTP_REQUESTS_TOTAL.as_ref() {
        register(registry, Box::new(m.clone()));
    }
    if let Some(m) = HTTP_REQUESTS_IN_FLIGHT.as_ref() {
        register(registry, Box::new(m.clone()));
    }

    // Engine
    if let Some(m) = ENGINE_RUNNING.as_ref() {
        register(registry, Box::new(m.clone()));
    }
    if let Some(m) = RECORDS_BY_STATE.as_ref() {
        register(registry, Box::new(m.clone()));
    }
    if let Some(m) = CONFIG_ISSUES.as_ref() {
        register(registry, Box::new(m.clone()));
    }

    // Core metrics (jobs, pushes, transitions, eviction)
    for metric in ptpilot_core::metrics::all_metrics() {
        register(registry, metric);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the engine and the record table
/// at scrape time.
pub fn collect_dynamic_metrics(state: &AppState) {
    let status = state.engine().status();
    if let Some(gauge) = ENGINE_RUNNING.as_ref() {
        gauge.set(i64::from(status.running));
    }
    if let Some(gauge) = CONFIG_ISSUES.as_ref() {
        gauge.set(status.issues.len() as i64);
    }

    if let Some(gauge) = RECORDS_BY_STATE.as_ref() {
        for record_state in RecordState::ALL {
            let filter = RecordFilter::new().with_state(record_state);
            if let Ok(count) = state.lifecycle().count(&filter) {
                gauge.with_label_values(&[record_state.as_str()]).set(count);
            }
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_uuid(segment) {
                "{id}"
            } else if segment.len() == 40 && segment.chars().all(|c| c.is_ascii_hexdigit()) {
                "{hash}"
            } else if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid(segment: &str) -> bool {
    let groups: Vec<&str> = segment.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}
