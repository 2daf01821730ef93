//! Job engine integration tests.
//!
//! Each test runs jobs through [`Engine::run_job`] against SQLite stores in a
//! temp dir, a mock tracker and mock download backends.

use std::sync::Arc;

use base64::Engine as _;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use ptpilot_core::directory::{NewAccount, NewBackend, NewRule};
use ptpilot_core::downloader::ItemState;
use ptpilot_core::engine::{
    AutoDeletePolicy, CapacityPolicy, DeleteScope, EngineError, EvictionStrategy, JobIntervals,
    ManualImport, SizeBasis,
};
use ptpilot_core::lifecycle::NewRecord;
use ptpilot_core::testing::{fixtures, MockConnector, MockTracker};
use ptpilot_core::tracker::Profile;
use ptpilot_core::{
    Account, AcquisitionRecord, Backend, BackendKind, BackendPool, DirectoryStore, Engine,
    EngineSettings, JobClass, JobContext, JobOutcome, LifecycleStore, PromotionClass,
    RecordFilter, RecordState, Rule, RuleMode, SchedulePolicy, SqliteDirectoryStore,
    SqliteLifecycleStore, StoreError, TimeWindow,
};

const GIB: u64 = fixtures::GIB;

struct TestHarness {
    directory: Arc<SqliteDirectoryStore>,
    lifecycle: Arc<SqliteLifecycleStore>,
    tracker: Arc<MockTracker>,
    connector: Arc<MockConnector>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        Self {
            directory: Arc::new(
                SqliteDirectoryStore::new(&db_path).expect("Failed to create directory store"),
            ),
            lifecycle: Arc::new(
                SqliteLifecycleStore::new(&db_path).expect("Failed to create lifecycle store"),
            ),
            tracker: Arc::new(MockTracker::new()),
            connector: Arc::new(MockConnector::new()),
            _temp_dir: temp_dir,
        }
    }

    fn engine(&self, settings: EngineSettings) -> Engine {
        self.engine_with(settings, self.lifecycle.clone())
    }

    fn engine_with(&self, settings: EngineSettings, lifecycle: Arc<dyn LifecycleStore>) -> Engine {
        let ctx = JobContext::new(
            self.directory.clone(),
            lifecycle,
            self.tracker.clone(),
            Arc::new(BackendPool::new(self.connector.clone())),
            settings,
        );
        Engine::new(Arc::new(ctx))
    }

    fn account(&self) -> Account {
        self.directory
            .create_account(NewAccount {
                username: "alice".to_string(),
                api_key: Some("secret-key".to_string()),
                active: true,
            })
            .unwrap()
    }

    fn backend(&self) -> Backend {
        self.directory
            .create_backend(NewBackend {
                name: "seedbox".to_string(),
                kind: BackendKind::QBittorrent,
                host: "localhost".to_string(),
                port: 8080,
                username: Some("admin".to_string()),
                password: Some("adminadmin".to_string()),
                use_tls: false,
                active: true,
            })
            .unwrap()
    }

    fn rule(&self, request: NewRule) -> Rule {
        self.directory.create_rule(request).unwrap()
    }

    /// A record already on `backend`, in `downloading`.
    fn tracked(
        &self,
        backend: &Backend,
        hash: &str,
        size_bytes: u64,
        promotion: PromotionClass,
        ends_at: Option<chrono::DateTime<Utc>>,
        rule: Option<&Rule>,
    ) -> AcquisitionRecord {
        let mut record = NewRecord::new(format!("item-{}", hash), hash, size_bytes)
            .with_backend(&backend.id)
            .with_hash(hash)
            .with_promotion(Some(promotion), ends_at)
            .with_state(RecordState::Pushing);
        if let Some(rule) = rule {
            record = record.with_rule(&rule.id).with_account(&rule.account_id);
        }
        let record = self.lifecycle.create(record).unwrap();
        self.lifecycle
            .transition(&record.id, RecordState::Downloading)
            .unwrap()
    }

    fn state_of(&self, record: &AcquisitionRecord) -> RecordState {
        self.lifecycle.get(&record.id).unwrap().unwrap().state
    }

    fn records(&self) -> Vec<AcquisitionRecord> {
        self.lifecycle.list(&RecordFilter::new()).unwrap()
    }
}

/// Lifecycle store whose moves to `deleted` fail.
struct StuckDeletes(Arc<SqliteLifecycleStore>);

impl LifecycleStore for StuckDeletes {
    fn create(&self, record: NewRecord) -> Result<AcquisitionRecord, StoreError> {
        self.0.create(record)
    }

    fn get(&self, id: &str) -> Result<Option<AcquisitionRecord>, StoreError> {
        self.0.get(id)
    }

    fn exists_for_item(&self, account_id: &str, item_id: &str) -> Result<bool, StoreError> {
        self.0.exists_for_item(account_id, item_id)
    }

    fn find_by_hash(
        &self,
        backend_id: &str,
        info_hash: &str,
    ) -> Result<Option<AcquisitionRecord>, StoreError> {
        self.0.find_by_hash(backend_id, info_hash)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<AcquisitionRecord>, StoreError> {
        self.0.list(filter)
    }

    fn count(&self, filter: &RecordFilter) -> Result<i64, StoreError> {
        self.0.count(filter)
    }

    fn transition(&self, id: &str, to: RecordState) -> Result<AcquisitionRecord, StoreError> {
        if to == RecordState::Deleted {
            return Err(StoreError::Database("database is locked".to_string()));
        }
        self.0.transition(id, to)
    }

    fn set_hash(&self, id: &str, info_hash: &str) -> Result<AcquisitionRecord, StoreError> {
        self.0.set_hash(id, info_hash)
    }
}

fn new_rule(account: &Account) -> NewRule {
    NewRule {
        account_id: account.id.clone(),
        name: "shows".to_string(),
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
    }
}

fn capacity_settings(backend: &Backend, strategy: EvictionStrategy, basis: SizeBasis) -> EngineSettings {
    EngineSettings {
        auto_delete: AutoDeletePolicy {
            capacity: CapacityPolicy {
                enabled: true,
                backend_id: Some(backend.id.clone()),
                high_threshold_bytes: 1000 * GIB,
                low_threshold_bytes: 800 * GIB,
                strategy,
                size_basis: basis,
                ..CapacityPolicy::default()
            },
            ..AutoDeletePolicy::default()
        },
        ..EngineSettings::default()
    }
}

// =============================================================================
// Acquisition
// =============================================================================

#[tokio::test]
async fn test_acquisition_pushes_matching_items() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    let rule = h.rule(NewRule {
        keywords: Some("show".to_string()),
        backend_id: Some(backend.id.clone()),
        tags: vec!["auto".to_string()],
        ..new_rule(&account)
    });
    h.tracker.set_items(vec![
        fixtures::tracker_item("1", "Good.Show.S01.1080p", 5.0),
        fixtures::tracker_item("2", "Other.Movie.2024", 5.0),
    ]);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(report.outcome, JobOutcome::Completed);
    assert_eq!(report.count("pushed"), 1);
    assert_eq!(report.count("unmatched"), 1);

    let records = h.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.item_id, "1");
    assert_eq!(record.state, RecordState::Pushing);
    assert_eq!(record.rule_id.as_deref(), Some(rule.id.as_str()));
    assert_eq!(record.backend_id.as_deref(), Some(backend.id.as_str()));
    assert_eq!(record.promotion_class, Some(PromotionClass::Free));

    let mock = h.connector.backend(&backend.id);
    let hash = record.info_hash.clone().unwrap();
    assert!(mock.contains(&hash));
    assert_eq!(mock.added()[0].tags, vec!["auto".to_string()]);

    // Already acquired items are not pushed again.
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();
    assert_eq!(report.count("pushed"), 0);
    assert_eq!(report.count("seen"), 1);
    assert_eq!(h.records().len(), 1);
}

#[tokio::test]
async fn test_full_backend_skips_search() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        max_downloading: Some(2),
        ..new_rule(&account)
    });
    let mock = h.connector.backend(&backend.id);
    mock.insert(fixtures::item_info("aa", "one", GIB));
    mock.insert(fixtures::item_info("bb", "two", GIB));
    h.tracker
        .set_items(vec![fixtures::tracker_item("1", "Some.Show", 1.0)]);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(h.tracker.search_count(), 0);
    assert_eq!(report.count("rules_at_capacity"), 1);
    assert!(h.records().is_empty());
}

#[tokio::test]
async fn test_cap_stops_item_loop() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        max_downloading: Some(2),
        ..new_rule(&account)
    });
    h.connector
        .backend(&backend.id)
        .insert(fixtures::item_info("aa", "one", GIB));
    h.tracker.set_items(vec![
        fixtures::tracker_item("1", "First", 1.0),
        fixtures::tracker_item("2", "Second", 1.0),
        fixtures::tracker_item("3", "Third", 1.0),
    ]);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(report.count("pushed"), 1);
    assert_eq!(report.count("cap_reached"), 1);
    assert_eq!(h.records().len(), 1);
}

#[tokio::test]
async fn test_rule_without_backend_holds_items() {
    let h = TestHarness::new();
    let account = h.account();
    h.rule(new_rule(&account));
    h.tracker
        .set_items(vec![fixtures::tracker_item("7", "Held.Item", 2.0)]);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(report.count("held"), 1);
    assert_eq!(h.tracker.fetch_count(), 1);
    let records = h.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, RecordState::Pending);
    assert!(records[0].backend_id.is_none());
}

#[tokio::test]
async fn test_fetch_failure_is_retried_next_cycle() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        ..new_rule(&account)
    });
    h.tracker.set_items(vec![
        fixtures::tracker_item("1", "Broken", 1.0),
        fixtures::tracker_item("2", "Fine", 1.0),
    ]);
    h.tracker.fail_fetch("1");

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(report.count("fetch_failed"), 1);
    assert_eq!(report.count("pushed"), 1);
    let records = h.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_id, "2");
}

#[tokio::test]
async fn test_push_failure_records_failed() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        ..new_rule(&account)
    });
    h.tracker
        .set_items(vec![fixtures::tracker_item("1", "Rejected", 1.0)]);
    h.connector.backend(&backend.id).fail_next_add("disk full");

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(report.count("push_failed"), 1);
    let records = h.records();
    assert_eq!(records[0].state, RecordState::Failed);
    assert!(records[0].info_hash.is_none());
}

#[tokio::test]
async fn test_missing_backend_is_reported() {
    let h = TestHarness::new();
    let account = h.account();
    let rule = h.rule(NewRule {
        backend_id: Some("no-such-backend".to_string()),
        ..new_rule(&account)
    });
    h.tracker
        .set_items(vec![fixtures::tracker_item("1", "Anything", 1.0)]);

    let engine = h.engine(EngineSettings::default());
    engine.run_job(JobClass::AutoDownload).await.unwrap();

    assert_eq!(h.tracker.search_count(), 0);
    let status = engine.status();
    assert_eq!(status.issues.len(), 1);
    assert_eq!(status.issues[0].job, JobClass::AutoDownload);
    assert_eq!(status.issues[0].subject, format!("rule:{}", rule.id));
}

#[tokio::test]
async fn test_promotion_filter_reaches_search() {
    let h = TestHarness::new();
    let account = h.account();
    h.rule(NewRule {
        free_only: true,
        mode: RuleMode::Adult,
        categories: vec!["410".to_string()],
        ..new_rule(&account)
    });

    let engine = h.engine(EngineSettings::default());
    engine.run_job(JobClass::AutoDownload).await.unwrap();

    let searches = h.tracker.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].mode, RuleMode::Adult);
    assert_eq!(searches[0].categories, vec!["410".to_string()]);
    assert!(searches[0].promotion.is_some());
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn test_expiry_removes_lapsed_item_with_matching_tags() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    let rule = h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        tags: vec!["auto".to_string()],
        ..new_rule(&account)
    });
    let record = h.tracked(
        &backend,
        "abc",
        10 * GIB,
        PromotionClass::Normal,
        Some(Utc::now() - Duration::hours(1)),
        Some(&rule),
    );
    let mut info = fixtures::item_info("abc", "lapsed", 10 * GIB);
    info.tags = vec!["auto".to_string(), "movie".to_string()];
    let mock = h.connector.backend(&backend.id);
    mock.insert(info);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(report.count("expired"), 1);
    assert_eq!(h.state_of(&record), RecordState::ExpiredDeleted);
    assert_eq!(mock.removed(), vec![("abc".to_string(), true)]);
}

#[tokio::test]
async fn test_expiry_skips_tag_mismatch() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    let rule = h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        tags: vec!["auto".to_string()],
        ..new_rule(&account)
    });
    let record = h.tracked(&backend, "abc", GIB, PromotionClass::Normal, None, Some(&rule));
    let mut info = fixtures::item_info("abc", "retagged", GIB);
    info.tags = vec!["keep".to_string()];
    h.connector.backend(&backend.id).insert(info);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(report.count("tag_mismatch"), 1);
    assert_eq!(h.state_of(&record), RecordState::Downloading);
    assert!(h.connector.backend(&backend.id).removed().is_empty());
}

#[tokio::test]
async fn test_expiry_respects_scope() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    let rule = h.rule(NewRule {
        backend_id: Some(backend.id.clone()),
        mode: RuleMode::Adult,
        ..new_rule(&account)
    });
    let record = h.tracked(&backend, "abc", GIB, PromotionClass::Percent50, None, Some(&rule));
    h.connector
        .backend(&backend.id)
        .insert(fixtures::item_info("abc", "adult", GIB));

    let settings = EngineSettings {
        auto_delete: AutoDeletePolicy {
            scope: DeleteScope::Normal,
            ..AutoDeletePolicy::default()
        },
        ..EngineSettings::default()
    };
    let engine = h.engine(settings);
    let report = engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(report.count("out_of_scope"), 1);
    assert_eq!(h.state_of(&record), RecordState::Downloading);
}

#[tokio::test]
async fn test_expiry_settles_missing_and_completed_items() {
    let h = TestHarness::new();
    let backend = h.backend();
    let ended = Some(Utc::now() - Duration::minutes(5));
    let gone = h.tracked(&backend, "gone", GIB, PromotionClass::Free, ended, None);
    let done = h.tracked(&backend, "done", GIB, PromotionClass::Free, ended, None);
    let mock = h.connector.backend(&backend.id);
    mock.insert(fixtures::item_info("done", "done", GIB));
    mock.set_progress("done", 100.0);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(report.count("missing"), 1);
    assert_eq!(report.count("completed"), 1);
    assert_eq!(h.state_of(&gone), RecordState::Deleted);
    assert_eq!(h.state_of(&done), RecordState::Completed);
    assert!(mock.removed().is_empty());
}

#[tokio::test]
async fn test_expiry_syncs_state_of_free_items() {
    let h = TestHarness::new();
    let backend = h.backend();
    let record = h.tracked(
        &backend,
        "free",
        GIB,
        PromotionClass::Free,
        Some(Utc::now() + Duration::hours(6)),
        None,
    );
    let mock = h.connector.backend(&backend.id);
    mock.insert(fixtures::item_info("free", "free", GIB));
    mock.set_state("free", ItemState::Paused);

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(report.count("synced"), 1);
    assert_eq!(h.state_of(&record), RecordState::Paused);
    assert!(mock.removed().is_empty());
}

#[tokio::test]
async fn test_expiry_disabled_never_deletes() {
    let h = TestHarness::new();
    let backend = h.backend();
    let record = h.tracked(&backend, "abc", GIB, PromotionClass::Normal, None, None);
    let mock = h.connector.backend(&backend.id);
    mock.insert(fixtures::item_info("abc", "x", GIB));

    let settings = EngineSettings {
        auto_delete: AutoDeletePolicy {
            enabled: false,
            ..AutoDeletePolicy::default()
        },
        ..EngineSettings::default()
    };
    let engine = h.engine(settings);
    engine.run_job(JobClass::ExpiredCheck).await.unwrap();

    assert_eq!(h.state_of(&record), RecordState::Downloading);
    assert!(mock.removed().is_empty());
}

// =============================================================================
// Eviction
// =============================================================================

/// Four tracked items, oldest first: a 60, b 30, c 20, d 50 GiB.
fn seed_eviction(h: &TestHarness, backend: &Backend) -> Vec<AcquisitionRecord> {
    let mock = h.connector.backend(&backend.id);
    mock.set_free_bytes(Some(700 * GIB));
    [("a", 60), ("b", 30), ("c", 20), ("d", 50)]
        .into_iter()
        .map(|(hash, gib)| {
            mock.insert(fixtures::item_info(hash, hash, gib * GIB));
            h.tracked(backend, hash, gib * GIB, PromotionClass::Free, None, None)
        })
        .collect()
}

#[tokio::test]
async fn test_eviction_removes_shortest_prefix() {
    let h = TestHarness::new();
    let backend = h.backend();
    let records = seed_eviction(&h, &backend);

    let engine = h.engine(capacity_settings(
        &backend,
        EvictionStrategy::OldestFirst,
        SizeBasis::Declared,
    ));
    let report = engine.run_job(JobClass::Eviction).await.unwrap();

    assert_eq!(report.count("deficit_bytes"), 100 * GIB);
    assert_eq!(report.count("evicted"), 3);
    assert_eq!(report.count("reclaimed_bytes"), 110 * GIB);
    let states: Vec<RecordState> = records.iter().map(|r| h.state_of(r)).collect();
    assert_eq!(
        states,
        vec![
            RecordState::DynamicDeleted,
            RecordState::DynamicDeleted,
            RecordState::DynamicDeleted,
            RecordState::Downloading,
        ]
    );
    assert!(h.connector.backend(&backend.id).contains("d"));
}

#[tokio::test]
async fn test_eviction_size_basis() {
    for (basis, expected) in [
        (SizeBasis::Declared, vec!["a"]),
        (SizeBasis::Downloaded, vec!["b", "d"]),
    ] {
        let h = TestHarness::new();
        let backend = h.backend();
        let mock = h.connector.backend(&backend.id);
        mock.set_free_bytes(Some(700 * GIB));
        for (hash, declared, downloaded) in [("a", 200, 10), ("b", 50, 50), ("c", 40, 40), ("d", 10, 60)] {
            let mut info = fixtures::item_info(hash, hash, declared * GIB);
            info.downloaded_bytes = downloaded * GIB;
            mock.insert(info);
            h.tracked(&backend, hash, declared * GIB, PromotionClass::Free, None, None);
        }

        let engine = h.engine(capacity_settings(&backend, EvictionStrategy::LargestFirst, basis));
        engine.run_job(JobClass::Eviction).await.unwrap();

        let mut removed: Vec<String> = mock.removed().into_iter().map(|(hash, _)| hash).collect();
        removed.sort();
        assert_eq!(removed, expected, "basis {:?}", basis);
    }
}

#[tokio::test]
async fn test_eviction_never_targets_untracked_or_terminal_items() {
    let h = TestHarness::new();
    let backend = h.backend();
    let mock = h.connector.backend(&backend.id);
    mock.set_free_bytes(Some(100 * GIB));
    mock.insert(fixtures::item_info("stranger", "stranger", 500 * GIB));
    mock.insert(fixtures::item_info("failed", "failed", 500 * GIB));
    let failed = h.tracked(&backend, "failed", 500 * GIB, PromotionClass::Free, None, None);
    h.lifecycle
        .transition(&failed.id, RecordState::Failed)
        .unwrap();

    let mut settings = capacity_settings(
        &backend,
        EvictionStrategy::OldestFirst,
        SizeBasis::Declared,
    );
    settings.auto_delete.capacity.include_untracked = false;
    let engine = h.engine(settings);
    let report = engine.run_job(JobClass::Eviction).await.unwrap();

    assert_eq!(report.count("untracked"), 1);
    assert_eq!(report.count("terminal"), 1);
    assert_eq!(report.count("reclaimed_bytes"), 0);
    assert!(mock.removed().is_empty());
}

#[tokio::test]
async fn test_eviction_includes_untracked_items_by_default() {
    let h = TestHarness::new();
    let account = h.account();
    let backend = h.backend();
    let rule = h.rule(NewRule {
        tags: vec!["auto".to_string()],
        ..new_rule(&account)
    });
    let mock = h.connector.backend(&backend.id);
    mock.set_free_bytes(Some(700 * GIB));

    // Added to the backend by hand, so no record tracks it.
    let mut stranger = fixtures::item_info("stranger", "stranger", 80 * GIB);
    stranger.tags = vec!["manual".to_string()];
    mock.insert(stranger);
    mock.insert(fixtures::item_info("done", "done", 500 * GIB));
    let done = h.tracked(&backend, "done", 500 * GIB, PromotionClass::Free, None, None);
    h.lifecycle.transition(&done.id, RecordState::Failed).unwrap();
    let mut a = fixtures::item_info("a", "a", 60 * GIB);
    a.tags = vec!["auto".to_string()];
    mock.insert(a);
    let a = h.tracked(&backend, "a", 60 * GIB, PromotionClass::Free, None, Some(&rule));
    mock.insert(fixtures::item_info("b", "b", 10 * GIB));
    let b = h.tracked(&backend, "b", 10 * GIB, PromotionClass::Free, None, None);

    let engine = h.engine(capacity_settings(
        &backend,
        EvictionStrategy::LargestFirst,
        SizeBasis::Declared,
    ));
    let report = engine.run_job(JobClass::Eviction).await.unwrap();

    // Largest first: stranger (80) then a (60) covers the 100 GiB gap.
    let mut removed: Vec<String> = mock.removed().into_iter().map(|(hash, _)| hash).collect();
    removed.sort();
    assert_eq!(removed, vec!["a", "stranger"]);
    assert_eq!(report.count("evicted"), 2);
    assert_eq!(report.count("evicted_untracked"), 1);
    assert_eq!(report.count("terminal"), 1);
    assert_eq!(report.count("reclaimed_bytes"), 140 * GIB);
    assert_eq!(h.state_of(&a), RecordState::DynamicDeleted);
    assert_eq!(h.state_of(&b), RecordState::Downloading);
    assert_eq!(h.state_of(&done), RecordState::Failed);
    assert_eq!(h.records().len(), 3);
}

#[tokio::test]
async fn test_eviction_replans_after_failed_removal() {
    let h = TestHarness::new();
    let backend = h.backend();
    let records = seed_eviction(&h, &backend);
    let mock = h.connector.backend(&backend.id);
    mock.fail_remove("b");

    let engine = h.engine(capacity_settings(
        &backend,
        EvictionStrategy::OldestFirst,
        SizeBasis::Declared,
    ));
    let report = engine.run_job(JobClass::Eviction).await.unwrap();

    // a + c reclaim 80 of 100; d covers the rest after b fails.
    assert_eq!(report.count("failed"), 1);
    assert_eq!(report.count("evicted"), 3);
    assert_eq!(report.count("reclaimed_bytes"), 130 * GIB);
    let states: Vec<RecordState> = records.iter().map(|r| h.state_of(r)).collect();
    assert_eq!(
        states,
        vec![
            RecordState::DynamicDeleted,
            RecordState::Downloading,
            RecordState::DynamicDeleted,
            RecordState::DynamicDeleted,
        ]
    );
}

#[tokio::test]
async fn test_eviction_missing_item_settles_or_counts_failure() {
    for stuck in [false, true] {
        let h = TestHarness::new();
        let backend = h.backend();
        let mock = h.connector.backend(&backend.id);
        mock.set_free_bytes(Some(700 * GIB));
        mock.insert(fixtures::item_info("a", "a", 60 * GIB));
        let a = h.tracked(&backend, "a", 60 * GIB, PromotionClass::Free, None, None);
        mock.insert(fixtures::item_info("b", "b", 30 * GIB));
        let b = h.tracked(&backend, "b", 30 * GIB, PromotionClass::Free, None, None);
        mock.vanish_on_remove("a");

        let lifecycle: Arc<dyn LifecycleStore> = if stuck {
            Arc::new(StuckDeletes(h.lifecycle.clone()))
        } else {
            h.lifecycle.clone()
        };
        let engine = h.engine_with(
            capacity_settings(&backend, EvictionStrategy::LargestFirst, SizeBasis::Declared),
            lifecycle,
        );
        let report = engine.run_job(JobClass::Eviction).await.unwrap();

        assert_eq!(report.count("evicted"), 1, "stuck {}", stuck);
        assert_eq!(report.count("reclaimed_bytes"), 30 * GIB);
        assert_eq!(h.state_of(&b), RecordState::DynamicDeleted);
        if stuck {
            assert_eq!(report.count("missing"), 0);
            assert_eq!(report.count("failed"), 1);
            assert_eq!(h.state_of(&a), RecordState::Downloading);
        } else {
            assert_eq!(report.count("missing"), 1);
            assert_eq!(report.count("failed"), 0);
            assert_eq!(h.state_of(&a), RecordState::Deleted);
        }
    }
}

#[tokio::test]
async fn test_eviction_idle_above_high_threshold() {
    let h = TestHarness::new();
    let backend = h.backend();
    seed_eviction(&h, &backend);
    h.connector
        .backend(&backend.id)
        .set_free_bytes(Some(1200 * GIB));

    let engine = h.engine(capacity_settings(
        &backend,
        EvictionStrategy::OldestFirst,
        SizeBasis::Declared,
    ));
    let report = engine.run_job(JobClass::Eviction).await.unwrap();

    assert_eq!(report.outcome, JobOutcome::Completed);
    assert_eq!(report.count("evicted"), 0);
    assert!(h.connector.backend(&backend.id).removed().is_empty());
}

#[tokio::test]
async fn test_eviction_disabled_is_skipped() {
    let h = TestHarness::new();
    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::Eviction).await.unwrap();
    assert!(matches!(report.outcome, JobOutcome::Skipped(_)));
}

// =============================================================================
// Refresh, manual operations, engine control
// =============================================================================

#[tokio::test]
async fn test_refresh_updates_account_stats() {
    let h = TestHarness::new();
    let account = h.account();
    h.directory
        .create_account(NewAccount {
            username: "no-key".to_string(),
            api_key: None,
            active: true,
        })
        .unwrap();
    h.tracker.set_profile(Profile {
        username: Some("alice".to_string()),
        uploaded_bytes: 3 * GIB,
        downloaded_bytes: GIB,
        ratio: 3.0,
        bonus: 1234.5,
    });

    let engine = h.engine(EngineSettings::default());
    let report = engine.run_job(JobClass::AccountRefresh).await.unwrap();

    assert_eq!(report.count("refreshed"), 1);
    assert_eq!(h.tracker.profile_count(), 1);
    let stored = h.directory.get_account(&account.id).unwrap().unwrap();
    assert_eq!(stored.stats.uploaded_bytes, 3 * GIB);
    assert_eq!(stored.stats.ratio, 3.0);
    assert!(stored.stats_refreshed_at.is_some());
}

#[tokio::test]
async fn test_manual_import_and_delete() {
    let h = TestHarness::new();
    let backend = h.backend();
    let engine = h.engine(EngineSettings::default());
    let payload = base64::engine::general_purpose::STANDARD
        .encode(fixtures::torrent_bytes("Manual.Import.mkv", 8192));
    let request = ManualImport {
        torrent: payload,
        backend_id: Some(backend.id.clone()),
        tags: vec!["manual".to_string()],
        save_path: None,
        item_id: None,
    };

    let record = engine.import(request.clone()).await.unwrap();
    assert_eq!(record.state, RecordState::Pushing);
    assert_eq!(record.name, "Manual.Import.mkv");
    assert_eq!(record.size_bytes, 8192);
    let hash = record.info_hash.clone().unwrap();
    let mock = h.connector.backend(&backend.id);
    assert!(mock.contains(&hash));

    let err = engine.import(request).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let deleted = engine.delete_record(&record.id, true).await.unwrap();
    assert_eq!(deleted.state, RecordState::Deleted);
    assert!(!mock.contains(&hash));
    assert_eq!(mock.removed(), vec![(hash, true)]);

    let err = engine.delete_record(&record.id, true).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_manual_import_rejects_garbage() {
    let h = TestHarness::new();
    let engine = h.engine(EngineSettings::default());
    let err = engine
        .import(ManualImport {
            torrent: "not base64!".to_string(),
            backend_id: None,
            tags: Vec::new(),
            save_path: None,
            item_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_status_reports_gate_and_window() {
    let h = TestHarness::new();
    let settings = EngineSettings {
        schedule: SchedulePolicy {
            enabled: true,
            timezone: "UTC".to_string(),
            windows: vec![TimeWindow {
                name: Some("all day".to_string()),
                ..TimeWindow::new("00:00", "24:00")
                    .with_permission(JobClass::AutoDownload, false)
            }],
        },
        ..EngineSettings::default()
    };
    let engine = h.engine(settings);

    let status = engine.status();
    assert_eq!(status.current_window.as_deref(), Some("all day"));
    let gate = |class: JobClass| {
        status
            .jobs
            .iter()
            .find(|j| j.job == class)
            .map(|j| j.gate_open)
            .unwrap()
    };
    assert!(!gate(JobClass::AutoDownload));
    assert!(gate(JobClass::ExpiredCheck));
    assert!(gate(JobClass::Eviction));

    // Manual triggers ignore the gate.
    let report = engine.run_job(JobClass::AutoDownload).await.unwrap();
    assert_eq!(report.outcome, JobOutcome::Completed);
}

#[tokio::test]
async fn test_policy_update_applies_to_next_run() {
    let h = TestHarness::new();
    let backend = h.backend();
    let records = seed_eviction(&h, &backend);
    let engine = h.engine(EngineSettings::default());

    let report = engine.run_job(JobClass::Eviction).await.unwrap();
    assert!(matches!(report.outcome, JobOutcome::Skipped(_)));

    let mut policy = engine.auto_delete_policy();
    policy.capacity.enabled = true;
    assert!(matches!(
        engine.set_auto_delete_policy(policy.clone()),
        Err(EngineError::InvalidInput(_))
    ));
    assert!(!engine.auto_delete_policy().capacity.enabled);

    policy.capacity.backend_id = Some(backend.id.clone());
    engine.set_auto_delete_policy(policy.clone()).unwrap();
    assert_eq!(engine.auto_delete_policy(), policy);

    let report = engine.run_job(JobClass::Eviction).await.unwrap();
    assert_eq!(report.outcome, JobOutcome::Completed);
    assert_eq!(report.count("evicted"), 3);
    assert_eq!(h.state_of(&records[0]), RecordState::DynamicDeleted);
}

#[tokio::test]
async fn test_schedule_update_moves_the_gate() {
    let h = TestHarness::new();
    let engine = h.engine(EngineSettings::default());
    let gate = |engine: &Engine| {
        engine
            .status()
            .jobs
            .iter()
            .find(|j| j.job == JobClass::AutoDownload)
            .map(|j| j.gate_open)
            .unwrap()
    };
    assert!(gate(&engine));

    let closed = SchedulePolicy {
        enabled: true,
        timezone: "UTC".to_string(),
        windows: vec![TimeWindow::new("00:00", "24:00")
            .with_permission(JobClass::AutoDownload, false)],
    };
    engine.set_schedule_policy(closed.clone()).unwrap();
    assert!(!gate(&engine));
    assert_eq!(engine.schedule_policy(), closed);

    let bad = SchedulePolicy {
        windows: vec![TimeWindow::new("25:00", "26:00")],
        ..closed
    };
    assert!(matches!(
        engine.set_schedule_policy(bad),
        Err(EngineError::InvalidInput(_))
    ));
    assert!(!gate(&engine));
}

#[tokio::test]
async fn test_runtime_updates_survive_restart() {
    let h = TestHarness::new();
    let backend = h.backend();
    let engine = h.engine(EngineSettings::default());

    let intervals = JobIntervals {
        refresh_secs: 600,
        acquisition_secs: 120,
        expiry_secs: 90,
        eviction_secs: 900,
    };
    engine.set_intervals(intervals).unwrap();
    let mut policy = AutoDeletePolicy::default();
    policy.scope = DeleteScope::Adult;
    policy.capacity.enabled = true;
    policy.capacity.backend_id = Some(backend.id.clone());
    engine.set_auto_delete_policy(policy.clone()).unwrap();
    let schedule = SchedulePolicy {
        enabled: true,
        timezone: "Europe/Berlin".to_string(),
        windows: vec![TimeWindow::new("01:00", "07:00")],
    };
    engine.set_schedule_policy(schedule.clone()).unwrap();
    drop(engine);

    let restarted = h.engine(EngineSettings::default());
    assert_eq!(restarted.intervals(), intervals);
    assert_eq!(restarted.auto_delete_policy(), policy);
    assert_eq!(restarted.schedule_policy(), schedule);
}

#[tokio::test]
async fn test_run_job_named_and_registry() {
    let h = TestHarness::new();
    let engine = h.engine(EngineSettings::default());

    assert!(matches!(
        engine.run_job_named("bogus").await,
        Err(EngineError::UnknownJob(_))
    ));

    engine.run_job_named("expired_check").await.unwrap();
    let status = engine.job_status(JobClass::ExpiredCheck).unwrap();
    assert_eq!(status.run_count, 1);
    assert!(status.last_run.is_some());
    assert!(!status.is_running);
}

#[tokio::test]
async fn test_start_stop_and_reschedule() {
    let h = TestHarness::new();
    let engine = h.engine(EngineSettings::default());

    engine.start();
    assert!(engine.status().running);

    let intervals = JobIntervals {
        refresh_secs: 600,
        acquisition_secs: 120,
        expiry_secs: 60,
        eviction_secs: 900,
    };
    engine.set_intervals(intervals).unwrap();
    assert_eq!(engine.status().intervals, intervals);
    for bad in [
        JobIntervals {
            expiry_secs: 0,
            ..intervals
        },
        JobIntervals {
            refresh_secs: 29,
            ..intervals
        },
        JobIntervals {
            acquisition_secs: 86_401,
            ..intervals
        },
        JobIntervals {
            expiry_secs: 3601,
            ..intervals
        },
    ] {
        let err = engine.set_intervals(bad).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)), "{:?}", bad);
    }
    // Rejected updates leave the running periods alone.
    assert_eq!(engine.status().intervals, intervals);

    // Bounds are inclusive.
    let edges = JobIntervals {
        refresh_secs: 30,
        acquisition_secs: 86_400,
        expiry_secs: 3600,
        eviction_secs: 30,
    };
    engine.set_intervals(edges).unwrap();
    assert_eq!(engine.intervals(), edges);

    engine.stop().await;
    assert!(!engine.status().running);
}
