//! Capacity eviction.
//!
//! When the bound backend's free space drops below the high threshold,
//! remove items in strategy order until the space reclaimed covers the gap
//! to the low threshold. Items with a terminal record are never touched;
//! items no record tracks are candidates unless the policy excludes them.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::directory::Rule;
use crate::downloader::DownloadBackend;
use crate::engine::context::{BackendUnavailable, JobContext};
use crate::engine::filters;
use crate::engine::strategy::{self, Candidate};
use crate::engine::types::{JobOutcome, JobReport};
use crate::lifecycle::{AcquisitionRecord, RecordState};
use crate::metrics;

const SUBJECT: &str = "auto_delete.capacity";

pub async fn run(ctx: &JobContext, report: &mut JobReport, issues: &mut Vec<(String, String)>) {
    let policy = ctx.auto_delete();
    let capacity = &policy.capacity;

    if !capacity.enabled {
        report.outcome = JobOutcome::Skipped("capacity eviction disabled".into());
        return;
    }
    let Some(backend_id) = capacity.backend_id.as_deref().filter(|b| !b.is_empty()) else {
        issues.push((SUBJECT.to_string(), "no backend bound".to_string()));
        report.fail("no backend bound");
        return;
    };

    let (backend, handle) = match ctx.connect_backend(backend_id).await {
        Ok(target) => target,
        Err(BackendUnavailable::Remote(e)) => {
            warn!(backend_id, error = %e, "eviction backend unavailable");
            ctx.note_backend_error(backend_id, &e).await;
            report.fail(e.to_string());
            return;
        }
        Err(other) => {
            issues.push((SUBJECT.to_string(), other.to_string()));
            report.fail(other.to_string());
            return;
        }
    };

    let stats = match ctx.backend_call(handle.stats()).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(backend_id, error = %e, "failed to read backend stats");
            ctx.note_backend_error(backend_id, &e).await;
            report.fail(e.to_string());
            return;
        }
    };
    let Some(free) = stats.free_bytes else {
        warn!(backend_id, "backend did not report free space");
        report.fail("free space unknown");
        return;
    };
    report.add("free_bytes", free);

    if free >= capacity.high_threshold_bytes {
        debug!(backend_id, free, high = capacity.high_threshold_bytes, "free space above threshold");
        return;
    }
    let deficit = capacity.low_threshold_bytes.saturating_sub(free);
    report.add("deficit_bytes", deficit);
    if deficit == 0 {
        debug!(backend_id, free, "free space between thresholds, nothing to reclaim");
        return;
    }
    info!(
        backend_id,
        free,
        deficit,
        strategy = capacity.strategy.as_str(),
        "free space low, evicting"
    );

    let active = match ctx.backend_call(handle.list_active()).await {
        Ok(active) => active,
        Err(e) => {
            warn!(backend_id, error = %e, "failed to list active items");
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

    let mut records: HashMap<String, AcquisitionRecord> = HashMap::new();
    let mut candidates = Vec::new();
    for item in &active {
        match ctx.lifecycle.find_by_hash(&backend.id, &item.hash) {
            Ok(Some(record)) if !record.state.is_terminal() => {
                let rule = record.rule_id.as_ref().and_then(|id| rules.get(id));
                if filters::check(&policy, rule, &item.tags).is_err() {
                    report.bump("filtered");
                    continue;
                }
                candidates.push(Candidate::new(item, Some(&record), capacity.size_basis));
                records.insert(record.id.clone(), record);
            }
            Ok(Some(_)) => report.bump("terminal"),
            Ok(None) if capacity.include_untracked => {
                candidates.push(Candidate::new(item, None, capacity.size_basis));
            }
            Ok(None) => report.bump("untracked"),
            Err(e) => {
                warn!(hash = %item.hash, error = %e, "record lookup failed");
                report.bump("failed");
            }
        }
    }
    report.add("candidates", candidates.len() as u64);

    strategy::order(capacity.strategy, &mut candidates);

    // Remove the planned prefix; when removals fail, plan again over the
    // rest for whatever is still outstanding.
    let mut remaining: &[Candidate] = &candidates;
    let mut reclaimed = 0u64;
    while reclaimed < deficit {
        let batch = strategy::plan(remaining, deficit - reclaimed);
        if batch.is_empty() {
            break;
        }
        debug!(planned = batch.len(), outstanding = deficit - reclaimed, "eviction batch");
        for candidate in batch {
            let record = candidate.record_id.as_ref().and_then(|id| records.get(id));
            reclaimed = reclaimed.saturating_add(
                evict(ctx, handle.as_ref(), candidate, record, report).await,
            );
        }
        remaining = &remaining[batch.len()..];
    }

    metrics::record_evicted_bytes(reclaimed);
    report.add("reclaimed_bytes", reclaimed);
    if reclaimed < deficit {
        warn!(backend_id, reclaimed, deficit, "eviction candidates exhausted");
    } else {
        info!(backend_id, reclaimed, evicted = report.count("evicted"), "eviction finished");
    }
}

/// Remove one candidate and settle its record. Returns the bytes freed.
async fn evict(
    ctx: &JobContext,
    handle: &dyn DownloadBackend,
    candidate: &Candidate,
    record: Option<&AcquisitionRecord>,
    report: &mut JobReport,
) -> u64 {
    match ctx.backend_call(handle.remove(&candidate.hash, true)).await {
        Ok(true) => {
            info!(
                hash = %candidate.hash,
                record_id = candidate.record_id.as_deref().unwrap_or("-"),
                name = %candidate.name,
                bytes = candidate.size_bytes,
                "evicted item"
            );
            match record {
                Some(record) => match ctx.transition(record, RecordState::DynamicDeleted) {
                    Ok(_) => report.bump("evicted"),
                    Err(_) => report.bump("failed"),
                },
                None => {
                    report.bump("evicted");
                    report.bump("evicted_untracked");
                }
            }
            candidate.size_bytes
        }
        Ok(false) => {
            let settled = record.map_or(true, |record| {
                ctx.transition(record, RecordState::Deleted).is_ok()
            });
            report.bump(if settled { "missing" } else { "failed" });
            0
        }
        Err(e) => {
            warn!(hash = %candidate.hash, error = %e, "remove failed");
            report.bump("failed");
            0
        }
    }
}
