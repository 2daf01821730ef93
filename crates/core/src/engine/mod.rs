//! Job engine: the periodic jobs that refresh accounts, acquire promoted
//! items, delete items whose promotion lapsed and evict under disk pressure.

mod config;
mod context;
pub mod filters;
mod guard;
mod issues;
pub mod jobs;
mod manual;
mod overrides;
mod policy;
mod registry;
mod runner;
pub mod strategy;
mod types;

pub use config::{
    check_interval, EngineConfig, JobIntervals, MAX_EXPIRY_INTERVAL_SECS, MAX_INTERVAL_SECS,
    MIN_INTERVAL_SECS,
};
pub use context::{EngineSettings, JobContext};
pub use guard::{OverlapGuard, RunGuard};
pub use issues::{ConfigIssue, IssueBoard};
pub use manual::ManualImport;
pub use policy::{AutoDeletePolicy, CapacityPolicy, DeleteScope, EvictionStrategy, SizeBasis};
pub use registry::{JobRegistry, JobStatus};
pub use runner::Engine;
pub use types::{EngineError, EngineStatus, JobOutcome, JobReport};
