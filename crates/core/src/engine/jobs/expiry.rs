//! Promotion expiry.
//!
//! Walks in-flight records that have a hash and a backend. Records whose
//! promotion window closed, or whose class was never free, are removed from
//! their backend (subject to the scope and tag filters) and marked
//! `expired_deleted`. Every other record gets its state synced from the
//! backend, so `pushing` records settle into the transfer states.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::directory::Rule;
use crate::downloader::{DownloadBackend, ItemInfo, ItemLookup, ItemState};
use crate::engine::context::{BackendUnavailable, JobContext};
use crate::engine::filters::{self, Exclusion};
use crate::engine::types::JobReport;
use crate::engine::AutoDeletePolicy;
use crate::lifecycle::{AcquisitionRecord, RecordFilter, RecordState};
use crate::promotion;

/// Per-record result, tallied into the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Expired,
    Completed,
    Missing,
    Synced,
    Unchanged,
    OutOfScope,
    TagMismatch,
    Failed,
}

impl Unit {
    fn counter(&self) -> &'static str {
        match self {
            Unit::Expired => "expired",
            Unit::Completed => "completed",
            Unit::Missing => "missing",
            Unit::Synced => "synced",
            Unit::Unchanged => "unchanged",
            Unit::OutOfScope => "out_of_scope",
            Unit::TagMismatch => "tag_mismatch",
            Unit::Failed => "failed",
        }
    }
}

struct Work {
    record: AcquisitionRecord,
    hash: String,
    handle: Arc<dyn DownloadBackend>,
    rule: Option<Rule>,
    expiring: bool,
}

pub async fn run(ctx: &JobContext, report: &mut JobReport, issues: &mut Vec<(String, String)>) {
    let filter = RecordFilter::new()
        .with_states(RecordState::ALL.into_iter().filter(|s| s.is_in_flight()))
        .with_hash_only();
    let records = match ctx.list_all(filter) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "failed to list in-flight records");
            report.fail(e.to_string());
            return;
        }
    };

    let rules: HashMap<String, Rule> = match ctx.directory.list_rules() {
        Ok(rules) => rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
        Err(e) => {
            warn!(error = %e, "failed to list rules");
            report.fail(e.to_string());
            return;
        }
    };

    let now = Utc::now();
    let policy = ctx.auto_delete();
    let expiry_enabled = policy.enabled;
    if !expiry_enabled {
        debug!("auto delete disabled, syncing states only");
    }

    let backend_ids: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.backend_id.clone())
        .collect();
    let mut handles = HashMap::new();
    for backend_id in backend_ids {
        match ctx.connect_backend(&backend_id).await {
            Ok((_, handle)) => {
                handles.insert(backend_id, handle);
            }
            Err(BackendUnavailable::Remote(e)) => {
                warn!(backend_id = %backend_id, error = %e, "backend unavailable");
                ctx.note_backend_error(&backend_id, &e).await;
                report.bump("backend_unavailable");
            }
            Err(other) => {
                issues.push((format!("backend:{}", backend_id), other.to_string()));
                report.bump("misconfigured");
            }
        }
    }

    let work: Vec<Work> = records
        .into_iter()
        .filter_map(|record| {
            let hash = record.info_hash.clone()?;
            let handle = handles.get(record.backend_id.as_deref()?)?.clone();
            let expiring = expiry_enabled && is_expiring(&record, now);
            let rule = record.rule_id.as_ref().and_then(|id| rules.get(id)).cloned();
            Some(Work {
                record,
                hash,
                handle,
                rule,
                expiring,
            })
        })
        .collect();
    report.add("scanned", work.len() as u64);
    report.add(
        "candidates",
        work.iter().filter(|w| w.expiring).count() as u64,
    );

    let units: Vec<Unit> = stream::iter(work)
        .map(|work| {
            let policy = &policy;
            async move { check_record(ctx, policy, work).await }
        })
        .buffer_unordered(ctx.fanout())
        .collect()
        .await;

    for unit in units {
        report.bump(unit.counter());
    }

    info!(
        scanned = report.count("scanned"),
        expired = report.count("expired"),
        completed = report.count("completed"),
        missing = report.count("missing"),
        failed = report.count("failed"),
        "expiry check finished"
    );
}

/// Whether a record's promotion no longer covers its download.
pub fn is_expiring(record: &AcquisitionRecord, now: DateTime<Utc>) -> bool {
    promotion::needs_expiry(
        record.promotion_class.as_ref(),
        record.promotion_ends_at,
        now,
    )
}

async fn check_record(ctx: &JobContext, policy: &AutoDeletePolicy, work: Work) -> Unit {
    let Work {
        record,
        hash,
        handle,
        rule,
        expiring,
    } = work;

    let info = match ctx.backend_call(handle.info(&hash)).await {
        Ok(ItemLookup::Found(info)) => info,
        Ok(ItemLookup::NotFound) => {
            debug!(record_id = %record.id, hash = %hash, "item gone from backend");
            return settle(ctx, &record, RecordState::Deleted, Unit::Missing);
        }
        Err(e) => {
            warn!(record_id = %record.id, hash = %hash, error = %e, "info lookup failed");
            return Unit::Failed;
        }
    };

    if info.is_complete() {
        return settle(ctx, &record, RecordState::Completed, Unit::Completed);
    }

    if !expiring {
        return sync(ctx, &record, &info);
    }

    match filters::check(policy, rule.as_ref(), &info.tags) {
        Err(Exclusion::OutOfScope) => {
            debug!(record_id = %record.id, "outside delete scope");
            return Unit::OutOfScope;
        }
        Err(Exclusion::TagMismatch) => {
            debug!(record_id = %record.id, tags = ?info.tags, "tags do not match rule");
            return Unit::TagMismatch;
        }
        Ok(()) => {}
    }

    match ctx.backend_call(handle.remove(&hash, true)).await {
        Ok(true) => {
            info!(
                record_id = %record.id,
                name = %record.name,
                promotion = ?record.promotion_class,
                ends_at = ?record.promotion_ends_at,
                progress = info.progress,
                "removed item whose promotion lapsed"
            );
            settle(ctx, &record, RecordState::ExpiredDeleted, Unit::Expired)
        }
        Ok(false) => settle(ctx, &record, RecordState::Deleted, Unit::Missing),
        Err(e) => {
            warn!(record_id = %record.id, error = %e, "remove failed");
            Unit::Failed
        }
    }
}

fn settle(ctx: &JobContext, record: &AcquisitionRecord, to: RecordState, unit: Unit) -> Unit {
    match ctx.transition(record, to) {
        Ok(_) => unit,
        Err(_) => Unit::Failed,
    }
}

/// Mirror the backend's transfer state onto the record.
fn sync(ctx: &JobContext, record: &AcquisitionRecord, info: &ItemInfo) -> Unit {
    let target = match info.state {
        ItemState::Downloading => RecordState::Downloading,
        ItemState::Paused => RecordState::Paused,
        ItemState::Queued => RecordState::Queued,
        ItemState::Seeding => RecordState::Seeding,
        ItemState::Completed => RecordState::Completed,
        ItemState::Error => return Unit::Unchanged,
    };
    if target == record.state || !record.state.can_transition_to(target) {
        return Unit::Unchanged;
    }
    settle(ctx, record, target, Unit::Synced)
}
