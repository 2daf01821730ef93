//! Rule-driven acquisition.
//!
//! Rules run one after another so that rules sharing a backend see each
//! other's pushes when checking the download cap. Within a rule, items are
//! processed in search order and each failure only affects its own item.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::directory::{Account, Backend, Rule};
use crate::downloader::{AddRequest, DownloadBackend, DownloaderError};
use crate::engine::context::{BackendUnavailable, JobContext};
use crate::engine::types::JobReport;
use crate::lifecycle::{NewRecord, RecordState};
use crate::matcher;
use crate::metrics;
use crate::tracker::{Credentials, PromotionFilter, SearchRequest, TrackerError, TrackerItem};

type Target = (Backend, Arc<dyn DownloadBackend>);

/// Run every enabled rule once.
pub async fn run(ctx: &JobContext, report: &mut JobReport, issues: &mut Vec<(String, String)>) {
    let rules = match ctx.directory.list_enabled_rules() {
        Ok(rules) => rules,
        Err(e) => {
            warn!(error = %e, "failed to list rules");
            report.fail(e.to_string());
            return;
        }
    };
    report.add("rules", rules.len() as u64);

    for rule in &rules {
        process_rule(ctx, rule, report, issues).await;
    }

    info!(
        rules = rules.len(),
        searched = report.count("searched"),
        pushed = report.count("pushed"),
        held = report.count("held"),
        push_failed = report.count("push_failed"),
        "acquisition finished"
    );
}

/// Search filter implied by the rule's promotion flags.
pub fn promotion_filter(rule: &Rule) -> Option<PromotionFilter> {
    if rule.free_only {
        Some(PromotionFilter::Free)
    } else if rule.double_upload {
        Some(PromotionFilter::DoubleUpload)
    } else {
        None
    }
}

async fn process_rule(
    ctx: &JobContext,
    rule: &Rule,
    report: &mut JobReport,
    issues: &mut Vec<(String, String)>,
) {
    let subject = format!("rule:{}", rule.id);

    let account = match ctx.directory.get_account(&rule.account_id) {
        Ok(Some(account)) => account,
        Ok(None) => {
            issues.push((subject, format!("account {} not found", rule.account_id)));
            report.bump("misconfigured");
            return;
        }
        Err(e) => {
            warn!(rule_id = %rule.id, error = %e, "failed to load account");
            report.bump("failed");
            return;
        }
    };
    if !account.active || !account.has_credentials() {
        debug!(rule_id = %rule.id, account_id = %account.id, "account inactive, skipping rule");
        report.bump("skipped_account");
        return;
    }

    let target = match &rule.backend_id {
        Some(backend_id) => match ctx.connect_backend(backend_id).await {
            Ok(target) => Some(target),
            Err(BackendUnavailable::Remote(e)) => {
                warn!(rule_id = %rule.id, backend_id = %backend_id, error = %e, "backend unavailable");
                ctx.note_backend_error(backend_id, &e).await;
                report.bump("backend_unavailable");
                return;
            }
            Err(other) => {
                issues.push((subject, other.to_string()));
                report.bump("misconfigured");
                return;
            }
        },
        None => None,
    };

    // 0 means no cap.
    let cap = rule
        .max_downloading
        .filter(|&c| c > 0)
        .map(|c| c as usize);

    let mut baseline = 0;
    if let (Some(cap), Some(target)) = (cap, &target) {
        match active_count(ctx, target).await {
            Ok(active) if active >= cap => {
                debug!(rule_id = %rule.id, active, cap, "download cap reached, skipping search");
                report.bump("rules_at_capacity");
                return;
            }
            Ok(active) => baseline = active,
            Err(_) => {
                report.bump("backend_unavailable");
                return;
            }
        }
    }

    let creds = Credentials::new(account.api_key.clone().unwrap_or_default());
    let request = SearchRequest::new(rule.mode)
        .with_page(1, ctx.engine.search_page_size)
        .with_categories(rule.categories.clone())
        .with_promotion(promotion_filter(rule));

    let page = match tokio::time::timeout(ctx.fetch_timeout(), ctx.tracker.search(&creds, &request))
        .await
        .unwrap_or(Err(TrackerError::Timeout))
    {
        Ok(page) => page,
        Err(e) => {
            warn!(rule_id = %rule.id, error = %e, "search failed");
            report.bump("search_failed");
            return;
        }
    };
    report.bump("searched");
    debug!(rule_id = %rule.id, items = page.items.len(), total = page.total, "search returned");

    let mut pushed = 0;
    for item in &page.items {
        match ctx.lifecycle.exists_for_item(&account.id, &item.id) {
            Ok(true) => {
                report.bump("seen");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "failed to check history");
                report.bump("failed");
                continue;
            }
        }

        if let Err(mismatch) = matcher::evaluate(item, rule) {
            debug!(rule_id = %rule.id, item_id = %item.id, reason = %mismatch, "item rejected");
            report.bump("unmatched");
            continue;
        }
        report.bump("matched");

        if let (Some(cap), Some(target)) = (cap, &target) {
            let live = match active_count(ctx, target).await {
                Ok(live) => live,
                Err(_) => {
                    report.bump("backend_unavailable");
                    break;
                }
            };
            // A just-added item may not be listed yet.
            let in_flight = live.max(baseline + pushed);
            if in_flight >= cap {
                info!(rule_id = %rule.id, in_flight, cap, "download cap reached");
                report.bump("cap_reached");
                break;
            }
        }

        if acquire_item(ctx, rule, &account, item, target.as_ref(), &creds, report).await {
            pushed += 1;
        }
    }
}

async fn active_count(ctx: &JobContext, target: &Target) -> Result<usize, DownloaderError> {
    let (backend, handle) = target;
    match ctx.backend_call(handle.list_active()).await {
        Ok(active) => Ok(active.len()),
        Err(e) => {
            warn!(backend_id = %backend.id, error = %e, "failed to list active items");
            ctx.note_backend_error(&backend.id, &e).await;
            Err(e)
        }
    }
}

/// Fetch, push and record one matched item. Returns whether it was pushed.
async fn acquire_item(
    ctx: &JobContext,
    rule: &Rule,
    account: &Account,
    item: &TrackerItem,
    target: Option<&Target>,
    creds: &Credentials,
    report: &mut JobReport,
) -> bool {
    let bytes = match tokio::time::timeout(ctx.fetch_timeout(), ctx.tracker.fetch_bytes(creds, &item.id))
        .await
        .unwrap_or(Err(TrackerError::Timeout))
    {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(item_id = %item.id, error = %e, "failed to fetch payload");
            report.bump("fetch_failed");
            return false;
        }
    };
    save_payload(ctx, &item.id, &bytes).await;

    let record = NewRecord::new(&item.id, &item.name, item.size_bytes)
        .with_account(&account.id)
        .with_rule(&rule.id)
        .with_promotion(Some(item.promotion.clone()), item.promotion_ends_at);

    let Some((backend, handle)) = target else {
        persist(ctx, record.with_state(RecordState::Pending), report);
        metrics::record_push("held");
        report.bump("held");
        return false;
    };

    let mut request = AddRequest::new(bytes).with_tags(rule.tags.clone());
    if let Some(path) = &rule.save_path {
        request = request.with_save_path(path.clone());
    }

    let record = record.with_backend(&backend.id);
    match tokio::time::timeout(ctx.fetch_timeout(), handle.add(request))
        .await
        .unwrap_or(Err(DownloaderError::Timeout))
    {
        Ok(hash) => {
            info!(
                rule_id = %rule.id,
                item_id = %item.id,
                backend_id = %backend.id,
                hash = %hash,
                promotion = %item.promotion,
                "pushed item"
            );
            persist(
                ctx,
                record.with_hash(hash).with_state(RecordState::Pushing),
                report,
            );
            metrics::record_push("pushed");
            report.bump("pushed");
            true
        }
        Err(e) => {
            warn!(item_id = %item.id, backend_id = %backend.id, error = %e, "push failed");
            ctx.note_backend_error(&backend.id, &e).await;
            persist(ctx, record.with_state(RecordState::Failed), report);
            metrics::record_push("failed");
            report.bump("push_failed");
            false
        }
    }
}

fn persist(ctx: &JobContext, record: NewRecord, report: &mut JobReport) {
    let item_id = record.item_id.clone();
    let state = record.state;
    match ctx.lifecycle.create(record) {
        Ok(created) => {
            metrics::record_transition(state.as_str());
            debug!(record_id = %created.id, item_id = %item_id, state = %state, "record created");
        }
        Err(e) => {
            warn!(item_id = %item_id, error = %e, "failed to persist record");
            report.bump("failed");
        }
    }
}

async fn save_payload(ctx: &JobContext, item_id: &str, bytes: &[u8]) {
    let Some(dir) = &ctx.engine.torrent_dir else {
        return;
    };
    let path = dir.join(format!("{}.torrent", item_id));
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, bytes).await
    }
    .await;
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to save payload");
    }
}
