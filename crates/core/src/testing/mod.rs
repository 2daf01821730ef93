//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the tracker and the download backends so the jobs can
//! run end to end against in-memory stores.
//!
//! # Example
//!
//! ```rust,ignore
//! use ptpilot_core::testing::{fixtures, MockConnector, MockTracker};
//!
//! let tracker = MockTracker::new();
//! tracker.set_items(vec![fixtures::tracker_item("1", "Some.Show.S01", 12.0)]);
//!
//! let connector = MockConnector::new();
//! connector.backend("b1").set_free_bytes(Some(700 * fixtures::GIB));
//! ```

use std::sync::{Mutex, MutexGuard};

mod mock_downloader;
mod mock_tracker;

pub use mock_downloader::{MockConnector, MockDownloadBackend};
pub use mock_tracker::MockTracker;

/// Lock a mock's state, ignoring poisoning from a panicked test thread.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::directory::{Account, AccountStats, Backend, BackendKind, Rule, RuleMode};
    use crate::downloader::{ItemInfo, ItemState};
    use crate::promotion::PromotionClass;
    use crate::tracker::TrackerItem;

    pub const GIB: u64 = 1024 * 1024 * 1024;

    /// A minimal single-file `.torrent`. Distinct names give distinct hashes.
    pub fn torrent_bytes(name: &str, length: u64) -> Vec<u8> {
        let mut info = Vec::new();
        info.extend_from_slice(format!("d6:lengthi{}e", length).as_bytes());
        info.extend_from_slice(format!("4:name{}:{}", name.len(), name).as_bytes());
        info.extend_from_slice(b"12:piece lengthi16384e");
        info.extend_from_slice(b"6:pieces20:");
        info.extend_from_slice(&[0u8; 20]);
        info.push(b'e');

        let announce = "http://tracker.example/announce";
        let mut out = Vec::new();
        out.extend_from_slice(format!("d8:announce{}:{}", announce.len(), announce).as_bytes());
        out.extend_from_slice(b"4:info");
        out.extend_from_slice(&info);
        out.push(b'e');
        out
    }

    /// An active qBittorrent backend on localhost.
    pub fn backend(id: &str) -> Backend {
        Backend {
            id: id.to_string(),
            name: format!("backend {}", id),
            kind: BackendKind::QBittorrent,
            host: "localhost".to_string(),
            port: 8080,
            username: Some("admin".to_string()),
            password: Some("adminadmin".to_string()),
            use_tls: false,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// An active account with credentials.
    pub fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            username: format!("user-{}", id),
            api_key: Some(format!("key-{}", id)),
            active: true,
            stats: AccountStats::default(),
            stats_refreshed_at: None,
            created_at: Utc::now(),
        }
    }

    /// An enabled rule with no constraints, no backend and no tags.
    pub fn rule(account_id: &str) -> Rule {
        Rule {
            id: "rule-1".to_string(),
            account_id: account_id.to_string(),
            name: "test rule".to_string(),
            enabled: true,
            mode: RuleMode::Normal,
            free_only: false,
            double_upload: false,
            min_size_gb: None,
            max_size_gb: None,
            min_seeders: None,
            max_seeders: None,
            categories: Vec::new(),
            keywords: None,
            exclude_keywords: None,
            backend_id: None,
            save_path: None,
            tags: Vec::new(),
            max_downloading: None,
            created_at: Utc::now(),
        }
    }

    /// A free listing with 10 seeders.
    pub fn tracker_item(id: &str, name: &str, size_gb: f64) -> TrackerItem {
        TrackerItem {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            category: None,
            size_bytes: (size_gb * GIB as f64) as u64,
            seeders: 10,
            leechers: 2,
            promotion: PromotionClass::Free,
            promotion_ends_at: None,
        }
    }

    /// A downloading item, 40% done, with nothing on disk accounted yet.
    pub fn item_info(hash: &str, name: &str, size_bytes: u64) -> ItemInfo {
        ItemInfo {
            hash: hash.to_string(),
            name: name.to_string(),
            progress: 40.0,
            native_state: "downloading".to_string(),
            state: ItemState::Downloading,
            size_bytes,
            downloaded_bytes: size_bytes * 2 / 5,
            tags: Vec::new(),
            added_at: Some(Utc::now()),
        }
    }
}
