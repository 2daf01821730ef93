//! Account stats refresh.

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::directory::{Account, AccountStats};
use crate::engine::context::JobContext;
use crate::engine::types::JobReport;
use crate::tracker::{Credentials, TrackerError};

/// Fetch the profile of every active account with credentials and
/// overwrite its cached stats. Failures are logged and skipped.
pub async fn run(ctx: &JobContext, report: &mut JobReport) {
    let accounts = match ctx.directory.list_accounts() {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!(error = %e, "failed to list accounts");
            report.fail(e.to_string());
            return;
        }
    };

    let targets: Vec<Account> = accounts
        .into_iter()
        .filter(|a| a.active && a.has_credentials())
        .collect();
    report.add("accounts", targets.len() as u64);

    let timeout = ctx.fetch_timeout();
    let results: Vec<(Account, Result<_, TrackerError>)> = stream::iter(targets)
        .map(|account| async move {
            let creds = Credentials::new(account.api_key.clone().unwrap_or_default());
            let result = match tokio::time::timeout(timeout, ctx.tracker.profile(&creds)).await {
                Ok(result) => result,
                Err(_) => Err(TrackerError::Timeout),
            };
            (account, result)
        })
        .buffer_unordered(ctx.fanout())
        .collect()
        .await;

    for (account, result) in results {
        let profile = match result {
            Ok(profile) => profile,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "profile refresh failed");
                report.bump("failed");
                continue;
            }
        };

        let stats = AccountStats {
            uploaded_bytes: profile.uploaded_bytes,
            downloaded_bytes: profile.downloaded_bytes,
            ratio: profile.ratio,
            bonus: profile.bonus,
        };
        match ctx.directory.update_account_stats(&account.id, &stats) {
            Ok(()) => {
                debug!(
                    account_id = %account.id,
                    ratio = stats.ratio,
                    uploaded = stats.uploaded_bytes,
                    "account stats refreshed"
                );
                report.bump("refreshed");
            }
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "failed to store account stats");
                report.bump("failed");
            }
        }
    }

    info!(
        refreshed = report.count("refreshed"),
        failed = report.count("failed"),
        "account refresh finished"
    );
}
