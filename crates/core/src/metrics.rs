//! Prometheus metrics for the job engine.
//!
//! Statics are created lazily; a definition that fails to build is simply
//! not recorded. Use the `record_*` helpers rather than the statics.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Job runs
// =============================================================================

/// Job runs total by job class and outcome.
pub static JOB_RUNS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ptpilot_job_runs_total", "Total job runs"),
        &["job", "outcome"], // "completed", "skipped", "failed"
    )
    .ok()
});

/// Job duration in seconds.
pub static JOB_DURATION: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("ptpilot_job_duration_seconds", "Duration of job runs")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["job"],
    )
    .ok()
});

// =============================================================================
// Records
// =============================================================================

/// Record state transitions by target state.
pub static RECORD_TRANSITIONS: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ptpilot_record_transitions_total",
            "Acquisition record transitions by target state",
        ),
        &["state"],
    )
    .ok()
});

/// Items pushed to a backend by result.
pub static PUSHES: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ptpilot_pushes_total", "Items pushed to download backends"),
        &["result"], // "pushed", "failed", "held"
    )
    .ok()
});

/// Bytes reclaimed by capacity eviction.
pub static EVICTED_BYTES: Lazy<Option<IntCounter>> = Lazy::new(|| {
    IntCounter::new(
        "ptpilot_evicted_bytes_total",
        "Bytes reclaimed by capacity eviction",
    )
    .ok()
});

// =============================================================================
// Helper functions
// =============================================================================

pub fn record_job_run(job: &str, outcome: &str, seconds: f64) {
    if let Some(runs) = JOB_RUNS.as_ref() {
        runs.with_label_values(&[job, outcome]).inc();
    }
    if let Some(duration) = JOB_DURATION.as_ref() {
        duration.with_label_values(&[job]).observe(seconds);
    }
}

pub fn record_transition(state: &str) {
    if let Some(transitions) = RECORD_TRANSITIONS.as_ref() {
        transitions.with_label_values(&[state]).inc();
    }
}

pub fn record_push(result: &str) {
    if let Some(pushes) = PUSHES.as_ref() {
        pushes.with_label_values(&[result]).inc();
    }
}

pub fn record_evicted_bytes(bytes: u64) {
    if let Some(evicted) = EVICTED_BYTES.as_ref() {
        evicted.inc_by(bytes);
    }
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    let mut metrics: Vec<Box<dyn prometheus::core::Collector>> = Vec::new();
    if let Some(m) = JOB_RUNS.as_ref() {
        metrics.push(Box::new(m.clone()));
    }
    if let Some(m) = JOB_DURATION.as_ref() {
        metrics.push(Box::new(m.clone()));
    }
    if let Some(m) = RECORD_TRANSITIONS.as_ref() {
        metrics.push(Box::new(m.clone()));
    }
    if let Some(m) = PUSHES.as_ref() {
        metrics.push(Box::new(m.clone()));
    }
    if let Some(m) = EVICTED_BYTES.as_ref() {
        metrics.push(Box::new(m.clone()));
    }
    metrics
}
