//! Operator-initiated import and delete.

use base64::Engine as _;
use serde::Deserialize;
use tracing::{info, warn};

use super::context::{BackendUnavailable, JobContext};
use super::types::EngineError;
use crate::downloader::AddRequest;
use crate::lifecycle::{AcquisitionRecord, NewRecord, RecordState};
use crate::metrics;
use crate::torrent_meta;

/// A `.torrent` handed in by an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualImport {
    /// Base64 of the `.torrent` file.
    pub torrent: String,
    /// Backend to push to. Without one the record is held as `pending`.
    #[serde(default)]
    pub backend_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub save_path: Option<String>,
    /// Tracker item id, if the payload came from the tracker.
    #[serde(default)]
    pub item_id: Option<String>,
}

/// Import a payload, push it if a backend was named, and record the result.
pub async fn import(ctx: &JobContext, request: ManualImport) -> Result<AcquisitionRecord, EngineError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.torrent.trim())
        .map_err(|e| EngineError::InvalidInput(format!("torrent is not valid base64: {}", e)))?;
    let meta = torrent_meta::inspect(&bytes)?;

    let item_id = request
        .item_id
        .clone()
        .unwrap_or_else(|| meta.info_hash.clone());
    let name = meta.name.clone().unwrap_or_else(|| meta.info_hash.clone());
    let record = NewRecord::new(item_id, name, meta.total_size).with_hash(&meta.info_hash);

    let Some(backend_id) = request.backend_id.as_deref() else {
        let created = ctx.lifecycle.create(record.with_state(RecordState::Pending))?;
        metrics::record_push("held");
        info!(record_id = %created.id, hash = %meta.info_hash, "imported without backend");
        return Ok(created);
    };

    if let Some(existing) = ctx.lifecycle.find_by_hash(backend_id, &meta.info_hash)? {
        if !existing.state.is_terminal() {
            return Err(EngineError::InvalidInput(format!(
                "{} is already tracked by record {}",
                meta.info_hash, existing.id
            )));
        }
    }

    let (backend, handle) = ctx.connect_backend(backend_id).await.map_err(|e| match e {
        BackendUnavailable::Missing(id) => EngineError::NotFound(format!("backend {}", id)),
        BackendUnavailable::Inactive(id) => {
            EngineError::Configuration(format!("backend {} is inactive", id))
        }
        BackendUnavailable::Remote(e) => EngineError::Downloader(e),
    })?;

    let mut add = AddRequest::new(bytes)
        .with_tags(request.tags.clone())
        .with_expected_hash(&meta.info_hash);
    if let Some(path) = &request.save_path {
        add = add.with_save_path(path.clone());
    }

    let record = record.with_backend(&backend.id);
    match tokio::time::timeout(ctx.fetch_timeout(), handle.add(add)).await {
        Ok(Ok(_)) => {
            let created = ctx.lifecycle.create(record.with_state(RecordState::Pushing))?;
            metrics::record_push("pushed");
            metrics::record_transition(RecordState::Pushing.as_str());
            info!(
                record_id = %created.id,
                backend_id = %backend.id,
                hash = %meta.info_hash,
                "imported and pushed"
            );
            Ok(created)
        }
        Ok(Err(e)) => {
            warn!(backend_id = %backend.id, error = %e, "manual push failed");
            ctx.note_backend_error(&backend.id, &e).await;
            let created = ctx.lifecycle.create(record.with_state(RecordState::Failed))?;
            metrics::record_push("failed");
            Ok(created)
        }
        Err(_) => {
            warn!(backend_id = %backend.id, "manual push timed out");
            let created = ctx.lifecycle.create(record.with_state(RecordState::Failed))?;
            metrics::record_push("failed");
            Ok(created)
        }
    }
}

/// Remove a record's item from its backend and mark it `deleted`.
///
/// Records without a hash or backend are marked directly. A backend that no
/// longer knows the item is not an error.
pub async fn delete(
    ctx: &JobContext,
    record_id: &str,
    purge: bool,
) -> Result<AcquisitionRecord, EngineError> {
    let record = ctx
        .lifecycle
        .get(record_id)?
        .ok_or_else(|| EngineError::NotFound(format!("record {}", record_id)))?;

    if record.state.is_terminal() {
        return Err(EngineError::InvalidInput(format!(
            "record {} is already {}",
            record.id, record.state
        )));
    }

    if let (Some(backend_id), Some(hash)) = (&record.backend_id, &record.info_hash) {
        match ctx.connect_backend(backend_id).await {
            Ok((_, handle)) => {
                let removed = ctx.backend_call(handle.remove(hash, purge)).await?;
                info!(record_id = %record.id, hash = %hash, removed, purge, "operator delete");
            }
            Err(BackendUnavailable::Remote(e)) => {
                ctx.note_backend_error(backend_id, &e).await;
                return Err(EngineError::Downloader(e));
            }
            Err(other) => {
                warn!(record_id = %record.id, reason = %other, "backend gone, marking deleted");
            }
        }
    }

    Ok(ctx.transition(&record, RecordState::Deleted)?)
}
