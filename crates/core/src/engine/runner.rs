//! Job engine.
//!
//! One loop per job class, each sleeping for its period and then asking the
//! schedule gate before running:
//! - Account refresh, acquisition and expiry are gated
//! - Eviction is never gated
//! - Runs of the same class never overlap; different classes run concurrently

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::context::JobContext;
use super::config::JobIntervals;
use super::guard::OverlapGuard;
use super::issues::IssueBoard;
use super::jobs::{acquisition, eviction, expiry, refresh};
use super::manual::{self, ManualImport};
use super::overrides;
use super::policy::AutoDeletePolicy;
use super::registry::{JobRegistry, JobStatus};
use super::types::{EngineError, EngineStatus, JobReport};
use crate::lifecycle::AcquisitionRecord;
use crate::metrics;
use crate::schedule::{JobClass, SchedulePolicy};

/// State shared between the engine handle and its loops.
struct Shared {
    ctx: Arc<JobContext>,
    registry: JobRegistry,
    issues: IssueBoard,
    guards: HashMap<JobClass, OverlapGuard>,
}

/// The job engine. Owns the loops for every [`JobClass`].
pub struct Engine {
    shared: Arc<Shared>,
    intervals_tx: watch::Sender<JobIntervals>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Engine {
    /// Build the engine, applying any overrides saved by earlier runtime
    /// updates on top of the configured values.
    pub fn new(ctx: Arc<JobContext>) -> Self {
        let store = ctx.directory.as_ref();
        let mut intervals = ctx.engine.intervals();
        if let Some(saved) = overrides::load::<JobIntervals>(store, overrides::INTERVALS) {
            match saved.validate() {
                Ok(()) => intervals = saved,
                Err(e) => warn!(error = %e, "ignoring saved intervals"),
            }
        }
        if let Some(saved) = overrides::load::<AutoDeletePolicy>(store, overrides::AUTO_DELETE) {
            match saved.validate() {
                Ok(()) => ctx.replace_auto_delete(saved),
                Err(e) => warn!(error = %e, "ignoring saved auto-delete policy"),
            }
        }
        if let Some(saved) = overrides::load::<SchedulePolicy>(store, overrides::SCHEDULE) {
            match saved.validate() {
                Ok(()) => ctx.replace_schedule(saved),
                Err(e) => warn!(error = %e, "ignoring saved schedule policy"),
            }
        }

        let (intervals_tx, _) = watch::channel(intervals);
        let (shutdown_tx, _) = broadcast::channel(1);
        let guards = JobClass::ALL
            .iter()
            .map(|&class| (class, OverlapGuard::new()))
            .collect();

        Self {
            shared: Arc::new(Shared {
                ctx,
                registry: JobRegistry::new(),
                issues: IssueBoard::new(),
                guards,
            }),
            intervals_tx,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn context(&self) -> &Arc<JobContext> {
        &self.shared.ctx
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the engine (spawns one loop per job class).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Engine already running");
            return;
        }
        if !self.shared.ctx.engine.enabled {
            info!("Engine disabled by configuration, loops not started");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        info!("Starting job engine");
        for class in JobClass::ALL {
            self.spawn_loop(class);
        }
        info!("Job engine started");
    }

    /// Stop the engine. In-flight runs finish or hit their timeouts.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Engine not running");
            return;
        }

        info!("Stopping job engine");
        let _ = self.shutdown_tx.send(());

        // Let loops observe the signal before returning.
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("Job engine stopped");
    }

    /// Current periods for each loop.
    pub fn intervals(&self) -> JobIntervals {
        *self.intervals_tx.borrow()
    }

    /// Change loop periods without a restart. Each loop restarts its sleep
    /// with the new period. The change is saved and survives restarts.
    pub fn set_intervals(&self, intervals: JobIntervals) -> Result<(), EngineError> {
        intervals.validate().map_err(EngineError::InvalidInput)?;
        overrides::save(
            self.shared.ctx.directory.as_ref(),
            overrides::INTERVALS,
            &intervals,
        )?;
        self.intervals_tx.send_replace(intervals);
        info!(?intervals, "job intervals updated");
        Ok(())
    }

    pub fn auto_delete_policy(&self) -> AutoDeletePolicy {
        self.shared.ctx.auto_delete()
    }

    /// Replace the auto-delete policy. Runs already in flight keep the
    /// policy they started with.
    pub fn set_auto_delete_policy(&self, policy: AutoDeletePolicy) -> Result<(), EngineError> {
        policy.validate().map_err(EngineError::InvalidInput)?;
        overrides::save(
            self.shared.ctx.directory.as_ref(),
            overrides::AUTO_DELETE,
            &policy,
        )?;
        info!(
            enabled = policy.enabled,
            capacity = policy.capacity.enabled,
            "auto-delete policy updated"
        );
        self.shared.ctx.replace_auto_delete(policy);
        Ok(())
    }

    pub fn schedule_policy(&self) -> SchedulePolicy {
        self.shared.ctx.schedule()
    }

    /// Replace the schedule policy. The next gate check sees it.
    pub fn set_schedule_policy(&self, policy: SchedulePolicy) -> Result<(), EngineError> {
        policy.validate().map_err(EngineError::InvalidInput)?;
        overrides::save(
            self.shared.ctx.directory.as_ref(),
            overrides::SCHEDULE,
            &policy,
        )?;
        info!(
            enabled = policy.enabled,
            windows = policy.windows.len(),
            "schedule policy updated"
        );
        self.shared.ctx.replace_schedule(policy);
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        let now = Utc::now();
        let schedule = self.shared.ctx.schedule();
        for class in JobClass::ALL {
            self.shared
                .registry
                .set_gate_open(class, schedule.allowed(class, now));
        }
        let current_window = schedule.current_window(now).map(|w| {
            w.name
                .clone()
                .unwrap_or_else(|| format!("{}-{}", w.start, w.end))
        });

        EngineStatus {
            running: self.is_running(),
            intervals: self.intervals(),
            jobs: self.shared.registry.all(),
            current_window,
            issues: self.shared.issues.list(),
        }
    }

    pub fn job_status(&self, class: JobClass) -> Option<JobStatus> {
        self.shared.registry.get(class)
    }

    /// Run a job now. Ignores the schedule gate but not the overlap guard.
    pub async fn run_job(&self, class: JobClass) -> Result<JobReport, EngineError> {
        info!(job = %class, "manual job trigger");
        self.shared.execute(class).await
    }

    pub async fn run_job_named(&self, name: &str) -> Result<JobReport, EngineError> {
        let class = JobClass::parse(name).ok_or_else(|| EngineError::UnknownJob(name.to_string()))?;
        self.run_job(class).await
    }

    pub async fn import(&self, request: ManualImport) -> Result<AcquisitionRecord, EngineError> {
        manual::import(&self.shared.ctx, request).await
    }

    pub async fn delete_record(
        &self,
        record_id: &str,
        purge: bool,
    ) -> Result<AcquisitionRecord, EngineError> {
        manual::delete(&self.shared.ctx, record_id, purge).await
    }

    fn spawn_loop(&self, class: JobClass) {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut intervals_rx = self.intervals_tx.subscribe();

        tokio::spawn(async move {
            info!(job = %class, "job loop started");
            loop {
                let period = intervals_rx.borrow_and_update().period(class);
                if let Ok(delta) = chrono::Duration::from_std(period) {
                    shared.registry.set_next_run(class, Utc::now() + delta);
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(job = %class, "job loop received shutdown signal");
                        break;
                    }
                    changed = intervals_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        debug!(job = %class, "period changed, rescheduling");
                    }
                    _ = tokio::time::sleep(period) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        shared.tick(class).await;
                    }
                }
            }
            info!(job = %class, "job loop stopped");
        });
    }
}

impl Shared {
    /// Scheduled run: check the gate, then execute.
    async fn tick(&self, class: JobClass) {
        let now = Utc::now();
        let open = self.ctx.schedule().allowed(class, now);
        self.registry.set_gate_open(class, open);
        if !open {
            debug!(job = %class, "outside schedule window, skipping");
            self.skip(class, now, "outside schedule window");
            return;
        }

        match self.execute(class).await {
            Ok(_) => {}
            Err(EngineError::AlreadyRunning(_)) => {
                debug!(job = %class, "previous run still in progress, skipping");
                self.skip(class, now, "previous run still in progress");
            }
            Err(e) => warn!(job = %class, error = %e, "job run failed"),
        }
    }

    async fn execute(&self, class: JobClass) -> Result<JobReport, EngineError> {
        let guard = self
            .guards
            .get(&class)
            .ok_or_else(|| EngineError::UnknownJob(class.to_string()))?;
        let Some(_run) = guard.try_acquire() else {
            return Err(EngineError::AlreadyRunning(class));
        };

        self.registry.record_start(class);
        let started = Instant::now();
        let mut report = JobReport::new(class, Utc::now());
        let mut found = Vec::new();

        let ctx = self.ctx.as_ref();
        match class {
            JobClass::AccountRefresh => refresh::run(ctx, &mut report).await,
            JobClass::AutoDownload => acquisition::run(ctx, &mut report, &mut found).await,
            JobClass::ExpiredCheck => expiry::run(ctx, &mut report, &mut found).await,
            JobClass::Eviction => eviction::run(ctx, &mut report, &mut found).await,
        }
        if class != JobClass::AccountRefresh {
            self.issues.replace(class, found, Utc::now());
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.finish(report.clone());
        Ok(report)
    }

    fn skip(&self, class: JobClass, at: chrono::DateTime<Utc>, reason: &str) {
        metrics::record_job_run(class.as_str(), "skipped", 0.0);
        self.registry.record_skip(class, at, reason);
    }

    fn finish(&self, report: JobReport) {
        metrics::record_job_run(
            report.job.as_str(),
            report.outcome.as_str(),
            report.duration_ms as f64 / 1000.0,
        );
        debug!(
            job = %report.job,
            outcome = report.outcome.as_str(),
            duration_ms = report.duration_ms,
            counters = ?report.counters,
            "job run finished"
        );
        self.registry.record_finish(&report);
    }
}
