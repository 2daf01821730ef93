pub mod cache;
pub mod config;
pub mod directory;
pub mod downloader;
pub mod engine;
pub mod lifecycle;
pub mod matcher;
pub mod metrics;
pub mod promotion;
pub mod schedule;
pub mod store;
pub mod testing;
pub mod torrent_meta;
pub mod tracker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use directory::{
    Account, Backend, BackendKind, DirectoryStore, Rule, RuleMode, SqliteDirectoryStore,
};
pub use downloader::{BackendPool, DownloadBackend, DownloaderError, HttpConnector};
pub use engine::{
    Engine, EngineError, EngineSettings, EngineStatus, JobContext, JobOutcome, JobReport,
};
pub use lifecycle::{
    AcquisitionRecord, LifecycleStore, RecordFilter, RecordState, SqliteLifecycleStore,
};
pub use promotion::PromotionClass;
pub use schedule::{JobClass, SchedulePolicy, TimeWindow};
pub use store::StoreError;
pub use tracker::{CachedTracker, MTeamClient, TrackerClient, TrackerError};
