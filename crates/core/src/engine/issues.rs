//! Outstanding configuration problems found while running jobs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::schedule::JobClass;

/// A rule or policy that could not be acted on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigIssue {
    pub job: JobClass,
    /// What is misconfigured, e.g. `rule:<id>` or `auto_delete.capacity`.
    pub subject: String,
    pub message: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Issues keyed by (job, subject). Each job run replaces its own set, so a
/// fixed rule drops off the list on the next cycle.
#[derive(Default)]
pub struct IssueBoard {
    issues: RwLock<BTreeMap<(JobClass, String), ConfigIssue>>,
}

impl IssueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every issue raised by `job` with `found` (subject, message).
    pub fn replace(&self, job: JobClass, found: Vec<(String, String)>, now: DateTime<Utc>) {
        let Ok(mut issues) = self.issues.write() else {
            return;
        };
        let previous: BTreeMap<String, DateTime<Utc>> = issues
            .iter()
            .filter(|((j, _), _)| *j == job)
            .map(|((_, subject), issue)| (subject.clone(), issue.first_seen))
            .collect();
        issues.retain(|(j, _), _| *j != job);

        for (subject, message) in found {
            let first_seen = previous.get(&subject).copied().unwrap_or(now);
            issues.insert(
                (job, subject.clone()),
                ConfigIssue {
                    job,
                    subject,
                    message,
                    first_seen,
                    last_seen: now,
                },
            );
        }
    }

    pub fn list(&self) -> Vec<ConfigIssue> {
        self.issues
            .read()
            .map(|issues| issues.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.issues.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_replace_is_scoped_to_job() {
        let board = IssueBoard::new();
        let now = Utc::now();
        board.replace(
            JobClass::AutoDownload,
            vec![("rule:r1".into(), "backend b9 not found".into())],
            now,
        );
        board.replace(
            JobClass::Eviction,
            vec![("auto_delete.capacity".into(), "backend missing".into())],
            now,
        );
        assert_eq!(board.len(), 2);

        board.replace(JobClass::AutoDownload, vec![], now);
        let left = board.list();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].job, JobClass::Eviction);
    }

    #[test]
    fn test_first_seen_survives_refresh() {
        let board = IssueBoard::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(3);
        let issue = || vec![("rule:r1".to_string(), "missing backend".to_string())];

        board.replace(JobClass::AutoDownload, issue(), t0);
        board.replace(JobClass::AutoDownload, issue(), t1);

        let listed = board.list();
        assert_eq!(listed[0].first_seen, t0);
        assert_eq!(listed[0].last_seen, t1);
    }
}
