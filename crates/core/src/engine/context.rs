//! Shared dependencies handed to every job.

use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, warn};

use super::config::EngineConfig;
use super::policy::AutoDeletePolicy;
use crate::config::Config;
use crate::directory::{Backend, DirectoryStore};
use crate::downloader::{BackendPool, DownloadBackend, DownloaderError};
use crate::lifecycle::{AcquisitionRecord, LifecycleStore, RecordFilter, RecordState};
use crate::metrics;
use crate::schedule::SchedulePolicy;
use crate::store::StoreError;
use crate::tracker::TrackerClient;

/// Policy and tuning the engine starts from.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub auto_delete: AutoDeletePolicy,
    pub schedule: SchedulePolicy,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: config.engine.clone(),
            auto_delete: config.auto_delete.clone(),
            schedule: config.schedule.clone(),
        }
    }
}

/// Policies an operator can replace while the engine runs. Each job run
/// reads a snapshot when it starts.
#[derive(Debug, Clone)]
struct RuntimePolicies {
    auto_delete: AutoDeletePolicy,
    schedule: SchedulePolicy,
}

/// Stores, remote clients and settings shared by all job runs.
pub struct JobContext {
    pub directory: Arc<dyn DirectoryStore>,
    pub lifecycle: Arc<dyn LifecycleStore>,
    pub tracker: Arc<dyn TrackerClient>,
    pub backends: Arc<BackendPool>,
    /// Tuning fixed for the engine's lifetime. Loop periods live in the
    /// runner.
    pub engine: EngineConfig,
    policies: RwLock<RuntimePolicies>,
}

/// Why a backend could not be used this cycle.
#[derive(Debug)]
pub(crate) enum BackendUnavailable {
    Missing(String),
    Inactive(String),
    Remote(DownloaderError),
}

impl JobContext {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        lifecycle: Arc<dyn LifecycleStore>,
        tracker: Arc<dyn TrackerClient>,
        backends: Arc<BackendPool>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            directory,
            lifecycle,
            tracker,
            backends,
            engine: settings.engine,
            policies: RwLock::new(RuntimePolicies {
                auto_delete: settings.auto_delete,
                schedule: settings.schedule,
            }),
        }
    }

    fn read_policies(&self) -> RwLockReadGuard<'_, RuntimePolicies> {
        self.policies.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_policies(&self) -> RwLockWriteGuard<'_, RuntimePolicies> {
        self.policies.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Current auto-delete policy.
    pub fn auto_delete(&self) -> AutoDeletePolicy {
        self.read_policies().auto_delete.clone()
    }

    /// Current schedule policy.
    pub fn schedule(&self) -> SchedulePolicy {
        self.read_policies().schedule.clone()
    }

    pub(crate) fn replace_auto_delete(&self, policy: AutoDeletePolicy) {
        self.write_policies().auto_delete = policy;
    }

    pub(crate) fn replace_schedule(&self, policy: SchedulePolicy) {
        self.write_policies().schedule = policy;
    }

    pub fn fanout(&self) -> usize {
        self.engine.max_fanout.max(1)
    }

    pub fn status_timeout(&self) -> Duration {
        self.engine.status_timeout()
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.engine.fetch_timeout()
    }

    /// Run a backend call under the status timeout.
    pub(crate) async fn backend_call<T, F>(&self, call: F) -> Result<T, DownloaderError>
    where
        F: Future<Output = Result<T, DownloaderError>>,
    {
        match tokio::time::timeout(self.status_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(DownloaderError::Timeout),
        }
    }

    /// Look up `backend_id` and get a connected handle for it.
    pub(crate) async fn connect_backend(
        &self,
        backend_id: &str,
    ) -> Result<(Backend, Arc<dyn DownloadBackend>), BackendUnavailable> {
        let backend = match self.directory.get_backend(backend_id) {
            Ok(Some(backend)) => backend,
            Ok(None) => return Err(BackendUnavailable::Missing(backend_id.to_string())),
            Err(e) => {
                return Err(BackendUnavailable::Remote(DownloaderError::ConnectionFailed(
                    e.to_string(),
                )))
            }
        };
        if !backend.active {
            return Err(BackendUnavailable::Inactive(backend_id.to_string()));
        }
        let handle = self
            .backend_call(self.backends.handle(&backend))
            .await
            .map_err(BackendUnavailable::Remote)?;
        Ok((backend, handle))
    }

    /// Drop pooled handles after errors that suggest a dead session.
    pub(crate) async fn note_backend_error(&self, backend_id: &str, error: &DownloaderError) {
        if matches!(
            error,
            DownloaderError::ConnectionFailed(_) | DownloaderError::AuthenticationFailed(_)
        ) {
            debug!(backend_id, "invalidating backend handle");
            self.backends.invalidate(backend_id).await;
        }
    }

    /// Page through every record matching `filter`.
    pub(crate) fn list_all(
        &self,
        filter: RecordFilter,
    ) -> Result<Vec<AcquisitionRecord>, StoreError> {
        const PAGE: i64 = 500;
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .lifecycle
                .list(&filter.clone().with_limit(PAGE).with_offset(offset))?;
            let len = page.len() as i64;
            out.extend(page);
            if len < PAGE {
                return Ok(out);
            }
            offset += PAGE;
        }
    }

    /// Move `record` to `to`, logging and counting the change.
    pub(crate) fn transition(
        &self,
        record: &AcquisitionRecord,
        to: RecordState,
    ) -> Result<AcquisitionRecord, StoreError> {
        match self.lifecycle.transition(&record.id, to) {
            Ok(updated) => {
                if record.state != to {
                    metrics::record_transition(to.as_str());
                    debug!(
                        record_id = %record.id,
                        from = %record.state,
                        to = %to,
                        "record transitioned"
                    );
                }
                Ok(updated)
            }
            Err(e) => {
                warn!(record_id = %record.id, to = %to, error = %e, "transition failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Display for BackendUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendUnavailable::Missing(id) => write!(f, "backend {} not found", id),
            BackendUnavailable::Inactive(id) => write!(f, "backend {} is inactive", id),
            BackendUnavailable::Remote(e) => write!(f, "{}", e),
        }
    }
}
