//! Eviction ordering.

use chrono::{DateTime, Utc};

use super::policy::{EvictionStrategy, SizeBasis};
use crate::downloader::ItemInfo;
use crate::lifecycle::AcquisitionRecord;

/// A backend item eligible for eviction, joined with its record when the
/// item is tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub hash: String,
    /// `None` for items the backend holds that no record tracks.
    pub record_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Space removal is expected to reclaim, per the configured basis.
    pub size_bytes: u64,
}

impl Candidate {
    /// Untracked items take their age from the backend's add time, or
    /// count as newest when the backend does not report one.
    pub fn new(item: &ItemInfo, record: Option<&AcquisitionRecord>, basis: SizeBasis) -> Self {
        let size_bytes = match basis {
            SizeBasis::Declared if item.size_bytes > 0 => item.size_bytes,
            SizeBasis::Declared => record.map_or(0, |r| r.size_bytes),
            SizeBasis::Downloaded => item.downloaded_bytes,
        };
        let created_at = record
            .map(|r| r.created_at)
            .or(item.added_at)
            .unwrap_or_else(Utc::now);
        Self {
            hash: item.hash.clone(),
            record_id: record.map(|r| r.id.clone()),
            name: item.name.clone(),
            created_at,
            size_bytes,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.record_id.is_some()
    }
}

/// Sort candidates in removal order. Ties fall back to hash for stability.
pub fn order(strategy: EvictionStrategy, candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        let primary = match strategy {
            EvictionStrategy::OldestFirst => a.created_at.cmp(&b.created_at),
            EvictionStrategy::NewestFirst => b.created_at.cmp(&a.created_at),
            EvictionStrategy::LargestFirst => b.size_bytes.cmp(&a.size_bytes),
            EvictionStrategy::SmallestFirst => a.size_bytes.cmp(&b.size_bytes),
        };
        primary.then_with(|| a.hash.cmp(&b.hash))
    });
}

/// Shortest prefix of `ordered` whose sizes sum to at least `deficit`.
/// Returns everything when the total falls short.
pub fn plan(ordered: &[Candidate], deficit: u64) -> &[Candidate] {
    let mut reclaimed = 0u64;
    for (i, candidate) in ordered.iter().enumerate() {
        if reclaimed >= deficit {
            return &ordered[..i];
        }
        reclaimed = reclaimed.saturating_add(candidate.size_bytes);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const GB: u64 = 1024 * 1024 * 1024;

    fn candidate(hash: &str, age_hours: i64, size_gb: u64) -> Candidate {
        Candidate {
            hash: hash.to_string(),
            record_id: Some(format!("rec-{}", hash)),
            name: hash.to_string(),
            created_at: Utc::now() - Duration::hours(age_hours),
            size_bytes: size_gb * GB,
        }
    }

    fn hashes(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.hash.as_str()).collect()
    }

    #[test]
    fn test_order_by_strategy() {
        let base = vec![
            candidate("a", 1, 50),
            candidate("b", 3, 10),
            candidate("c", 2, 80),
        ];

        let mut c = base.clone();
        order(EvictionStrategy::OldestFirst, &mut c);
        assert_eq!(hashes(&c), vec!["b", "c", "a"]);

        let mut c = base.clone();
        order(EvictionStrategy::NewestFirst, &mut c);
        assert_eq!(hashes(&c), vec!["a", "c", "b"]);

        let mut c = base.clone();
        order(EvictionStrategy::LargestFirst, &mut c);
        assert_eq!(hashes(&c), vec!["c", "a", "b"]);

        let mut c = base;
        order(EvictionStrategy::SmallestFirst, &mut c);
        assert_eq!(hashes(&c), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_plan_takes_minimal_prefix() {
        let ordered = vec![
            candidate("a", 4, 60),
            candidate("b", 3, 30),
            candidate("c", 2, 20),
            candidate("d", 1, 70),
        ];
        // 60 + 30 = 90 < 100; adding c reaches 110.
        assert_eq!(hashes(plan(&ordered, 100 * GB)), vec!["a", "b", "c"]);
        assert_eq!(hashes(plan(&ordered, 60 * GB)), vec!["a"]);
        assert!(plan(&ordered, 0).is_empty());
    }

    #[test]
    fn test_plan_exhausts_when_short() {
        let ordered = vec![candidate("a", 2, 10), candidate("b", 1, 10)];
        assert_eq!(plan(&ordered, 100 * GB).len(), 2);
    }

    #[test]
    fn test_untracked_candidate_uses_backend_fields() {
        let added = Utc::now() - Duration::days(3);
        let item = ItemInfo {
            hash: "f00d".to_string(),
            name: "stray".to_string(),
            progress: 40.0,
            native_state: "downloading".to_string(),
            state: crate::downloader::ItemState::Downloading,
            size_bytes: 0,
            downloaded_bytes: 4 * GB,
            tags: vec![],
            added_at: Some(added),
        };

        let declared = Candidate::new(&item, None, SizeBasis::Declared);
        assert!(!declared.is_tracked());
        assert_eq!(declared.size_bytes, 0);
        assert_eq!(declared.created_at, added);

        let downloaded = Candidate::new(&item, None, SizeBasis::Downloaded);
        assert_eq!(downloaded.size_bytes, 4 * GB);
    }
}
