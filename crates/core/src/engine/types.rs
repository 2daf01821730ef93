//! Types for the job engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::JobClass;

use super::config::JobIntervals;
use super::issues::ConfigIssue;
use super::registry::JobStatus;

/// Errors surfaced by engine operations. Per-unit failures inside a job
/// never become one of these; they are counted in the [`JobReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Job name did not parse.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// A run of the same class is in flight.
    #[error("job already running: {0}")]
    AlreadyRunning(JobClass),

    /// Record, rule, account or backend missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad operator input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Rule or policy points at something that does not exist.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("downloader error: {0}")]
    Downloader(#[from] crate::downloader::DownloaderError),

    #[error("tracker error: {0}")]
    Tracker(#[from] crate::tracker::TrackerError),

    #[error("torrent metadata error: {0}")]
    TorrentMeta(#[from] crate::torrent_meta::TorrentMetaError),
}

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Ran over all its units. Individual units may still have failed.
    Completed,
    /// Did not run (gate closed, policy disabled).
    Skipped(String),
    /// Could not start its work at all (store unreadable, backend down).
    Failed(String),
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Skipped(_) => "skipped",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Summary of one job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobClass,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: JobOutcome,
    /// Named counters, e.g. `searched`, `pushed`, `expired`.
    pub counters: BTreeMap<String, u64>,
}

impl JobReport {
    pub fn new(job: JobClass, started_at: DateTime<Utc>) -> Self {
        Self {
            job,
            started_at,
            duration_ms: 0,
            outcome: JobOutcome::Completed,
            counters: BTreeMap::new(),
        }
    }

    pub fn skipped(job: JobClass, started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            outcome: JobOutcome::Skipped(reason.into()),
            ..Self::new(job, started_at)
        }
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.outcome = JobOutcome::Failed(reason.into());
        self
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.outcome = JobOutcome::Failed(reason.into());
    }

    pub fn bump(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, amount: u64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn count(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub intervals: JobIntervals,
    pub jobs: Vec<JobStatus>,
    /// Name or bounds of the schedule window in effect, if any.
    pub current_window: Option<String>,
    pub issues: Vec<ConfigIssue>,
}
