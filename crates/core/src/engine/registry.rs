//! Per-job execution bookkeeping for the status endpoint.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::schedule::JobClass;

use super::types::{JobOutcome, JobReport};

/// Status of one job class.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobClass,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_outcome: Option<JobOutcome>,
    #[serde(default)]
    pub last_counters: BTreeMap<String, u64>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub skip_count: u64,
    pub error_count: u64,
    pub is_running: bool,
    /// Whether the schedule gate currently lets this class run.
    pub gate_open: bool,
}

impl JobStatus {
    fn new(job: JobClass) -> Self {
        Self {
            job,
            last_run: None,
            last_duration_ms: None,
            last_outcome: None,
            last_counters: BTreeMap::new(),
            next_run: None,
            run_count: 0,
            skip_count: 0,
            error_count: 0,
            is_running: false,
            gate_open: true,
        }
    }
}

/// Thread-safe registry of job statuses, one entry per [`JobClass`].
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobClass, JobStatus>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        let jobs = JobClass::ALL
            .iter()
            .map(|&class| (class, JobStatus::new(class)))
            .collect();
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    fn update(&self, job: JobClass, f: impl FnOnce(&mut JobStatus)) {
        if let Ok(mut jobs) = self.jobs.write() {
            if let Some(status) = jobs.get_mut(&job) {
                f(status);
            }
        }
    }

    pub fn record_start(&self, job: JobClass) {
        self.update(job, |s| s.is_running = true);
    }

    pub fn record_finish(&self, report: &JobReport) {
        self.update(report.job, |s| {
            s.is_running = false;
            s.last_run = Some(report.started_at);
            s.last_duration_ms = Some(report.duration_ms);
            s.last_counters = report.counters.clone();
            match &report.outcome {
                JobOutcome::Completed => s.run_count += 1,
                JobOutcome::Skipped(_) => s.skip_count += 1,
                JobOutcome::Failed(_) => {
                    s.run_count += 1;
                    s.error_count += 1;
                }
            }
            s.last_outcome = Some(report.outcome.clone());
        });
    }

    /// A scheduled run that never started. Leaves `is_running` alone, since
    /// an overlap skip happens while another run is in flight.
    pub fn record_skip(&self, job: JobClass, at: DateTime<Utc>, reason: &str) {
        self.update(job, |s| {
            s.skip_count += 1;
            s.last_run = Some(at);
            s.last_outcome = Some(JobOutcome::Skipped(reason.to_string()));
        });
    }

    pub fn set_next_run(&self, job: JobClass, at: DateTime<Utc>) {
        self.update(job, |s| s.next_run = Some(at));
    }

    pub fn set_gate_open(&self, job: JobClass, open: bool) {
        self.update(job, |s| s.gate_open = open);
    }

    pub fn get(&self, job: JobClass) -> Option<JobStatus> {
        self.jobs.read().ok()?.get(&job).cloned()
    }

    /// All statuses in [`JobClass::ALL`] order.
    pub fn all(&self) -> Vec<JobStatus> {
        let Ok(jobs) = self.jobs.read() else {
            return Vec::new();
        };
        JobClass::ALL
            .iter()
            .filter_map(|c| jobs.get(c).cloned())
            .collect()
    }
}
