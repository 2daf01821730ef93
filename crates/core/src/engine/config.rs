//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schedule::JobClass;

/// Timers, timeouts and fan-out for the job engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When disabled the loops are not started; jobs can still be
    /// triggered through the API.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Account stats refresh period (seconds).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Rule check / acquisition period (seconds).
    #[serde(default = "default_acquisition_interval")]
    pub acquisition_interval_secs: u64,

    /// Promotion expiry check period (seconds).
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    /// Capacity eviction period (seconds).
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,

    /// Timeout for backend status calls (seconds).
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,

    /// Timeout for fetching a payload from the tracker (seconds).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum concurrent remote calls within one job run.
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Items requested per rule search.
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Optional directory where fetched payloads are kept.
    #[serde(default)]
    pub torrent_dir: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_acquisition_interval() -> u64 {
    180
}

fn default_expiry_interval() -> u64 {
    60
}

fn default_eviction_interval() -> u64 {
    1800
}

fn default_status_timeout() -> u64 {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_fanout() -> usize {
    4
}

fn default_search_page_size() -> u32 {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            refresh_interval_secs: default_refresh_interval(),
            acquisition_interval_secs: default_acquisition_interval(),
            expiry_interval_secs: default_expiry_interval(),
            eviction_interval_secs: default_eviction_interval(),
            status_timeout_secs: default_status_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_fanout: default_max_fanout(),
            search_page_size: default_search_page_size(),
            torrent_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn intervals(&self) -> JobIntervals {
        JobIntervals {
            refresh_secs: self.refresh_interval_secs,
            acquisition_secs: self.acquisition_interval_secs,
            expiry_secs: self.expiry_interval_secs,
            eviction_secs: self.eviction_interval_secs,
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Shortest period any loop may run at.
pub const MIN_INTERVAL_SECS: u64 = 30;
/// Longest period for refresh, acquisition and eviction.
pub const MAX_INTERVAL_SECS: u64 = 24 * 3600;
/// Expiry has to notice lapsed promotions quickly.
pub const MAX_EXPIRY_INTERVAL_SECS: u64 = 3600;

/// Check `value` against `[MIN_INTERVAL_SECS, max]`.
pub fn check_interval(name: &str, value: u64, max: u64) -> Result<(), String> {
    if value < MIN_INTERVAL_SECS || value > max {
        return Err(format!(
            "{} must be between {} and {} seconds, got {}",
            name, MIN_INTERVAL_SECS, max, value
        ));
    }
    Ok(())
}

/// Loop periods, adjustable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIntervals {
    pub refresh_secs: u64,
    pub acquisition_secs: u64,
    pub expiry_secs: u64,
    pub eviction_secs: u64,
}

impl JobIntervals {
    pub fn validate(&self) -> Result<(), String> {
        check_interval("refresh_secs", self.refresh_secs, MAX_INTERVAL_SECS)?;
        check_interval("acquisition_secs", self.acquisition_secs, MAX_INTERVAL_SECS)?;
        check_interval("expiry_secs", self.expiry_secs, MAX_EXPIRY_INTERVAL_SECS)?;
        check_interval("eviction_secs", self.eviction_secs, MAX_INTERVAL_SECS)
    }

    pub fn period(&self, class: JobClass) -> Duration {
        let secs = match class {
            JobClass::AccountRefresh => self.refresh_secs,
            JobClass::AutoDownload => self.acquisition_secs,
            JobClass::ExpiredCheck => self.expiry_secs,
            JobClass::Eviction => self.eviction_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

impl Default for JobIntervals {
    fn default() -> Self {
        EngineConfig::default().intervals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.refresh_interval_secs, 300);
        assert_eq!(config.acquisition_interval_secs, 180);
        assert_eq!(config.expiry_interval_secs, 60);
        assert_eq!(config.eviction_interval_secs, 1800);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(config.torrent_dir.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = toml::from_str(
            r#"
            expiry_interval_secs = 120
            torrent_dir = "/var/lib/ptpilot/torrents"
        "#,
        )
        .unwrap();
        assert_eq!(config.expiry_interval_secs, 120);
        assert_eq!(config.acquisition_interval_secs, 180);
        assert_eq!(
            config.torrent_dir.as_deref(),
            Some(std::path::Path::new("/var/lib/ptpilot/torrents"))
        );
    }

    #[test]
    fn test_period_per_class() {
        let intervals = EngineConfig::default().intervals();
        assert_eq!(
            intervals.period(JobClass::Eviction),
            Duration::from_secs(1800)
        );
        assert_eq!(
            intervals.period(JobClass::AutoDownload),
            Duration::from_secs(180)
        );
    }

    #[test]
    fn test_interval_bounds() {
        let ok = EngineConfig::default().intervals();
        assert!(ok.validate().is_ok());

        let err = JobIntervals {
            eviction_secs: 29,
            ..ok
        }
        .validate()
        .unwrap_err();
        assert!(err.contains("eviction_secs"));
        assert!(JobIntervals {
            expiry_secs: MAX_EXPIRY_INTERVAL_SECS + 1,
            ..ok
        }
        .validate()
        .is_err());
        assert!(JobIntervals {
            refresh_secs: MAX_INTERVAL_SECS,
            ..ok
        }
        .validate()
        .is_ok());
    }
}
