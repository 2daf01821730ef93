use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::downloader::DownloaderTimeouts;
use crate::engine::{AutoDeletePolicy, EngineConfig};
use crate::schedule::SchedulePolicy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub downloader: DownloaderTimeouts,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub auto_delete: AutoDeletePolicy,
    #[serde(default)]
    pub schedule: SchedulePolicy,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ptpilot.db")
}

/// Tracker site configuration. Per-account API keys live in the database.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Site root, e.g. "https://api.m-team.cc"
    #[serde(default = "default_tracker_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Zone used for naive promotion end times.
    #[serde(default = "default_tracker_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub cache: TrackerCacheConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: default_tracker_url(),
            timeout_secs: default_timeout(),
            timezone: default_tracker_timezone(),
            cache: TrackerCacheConfig::default(),
        }
    }
}

fn default_tracker_url() -> String {
    "https://api.m-team.cc".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_tracker_timezone() -> String {
    "Asia/Shanghai".to_string()
}

/// Tracker response cache
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackerCacheConfig {
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,
    #[serde(default = "default_detail_ttl")]
    pub detail_ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for TrackerCacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl(),
            detail_ttl_secs: default_detail_ttl(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_search_ttl() -> u64 {
    30
}

fn default_detail_ttl() -> u64 {
    300
}

fn default_max_entries() -> usize {
    512
}

fn default_sweep_interval() -> u64 {
    300
}

/// Config as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracker: SanitizedTrackerConfig,
    pub downloader: DownloaderTimeouts,
    pub engine: EngineConfig,
    pub auto_delete: AutoDeletePolicy,
    pub schedule: SchedulePolicy,
}

/// Tracker section without cache internals
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrackerConfig {
    pub base_url: String,
    pub timezone: String,
    pub timeout_secs: u64,
    pub cache_enabled: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            tracker: SanitizedTrackerConfig {
                base_url: config.tracker.base_url.clone(),
                timezone: config.tracker.timezone.clone(),
                timeout_secs: config.tracker.timeout_secs,
                cache_enabled: config.tracker.cache.search_ttl_secs > 0
                    || config.tracker.cache.detail_ttl_secs > 0,
            },
            downloader: config.downloader,
            engine: config.engine.clone(),
            auto_delete: config.auto_delete.clone(),
            schedule: config.schedule.clone(),
        }
    }
}
