//! Time-window gate for scheduled jobs.

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Job classes the engine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    AccountRefresh,
    AutoDownload,
    ExpiredCheck,
    /// Capacity eviction; never gated.
    Eviction,
}

impl JobClass {
    pub const ALL: [JobClass; 4] = [
        JobClass::AccountRefresh,
        JobClass::AutoDownload,
        JobClass::ExpiredCheck,
        JobClass::Eviction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::AccountRefresh => "account_refresh",
            JobClass::AutoDownload => "auto_download",
            JobClass::ExpiredCheck => "expired_check",
            JobClass::Eviction => "eviction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == value)
    }

    /// Whether the schedule gate applies to this class.
    pub fn is_gated(&self) -> bool {
        !matches!(self, JobClass::Eviction)
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// One window with per-class permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub name: Option<String>,
    /// `HH:MM`, inclusive.
    pub start: String,
    /// `HH:MM`, exclusive. `24:00` is accepted.
    pub end: String,
    #[serde(default = "default_true")]
    pub auto_download: bool,
    #[serde(default = "default_true")]
    pub expired_check: bool,
    #[serde(default = "default_true")]
    pub account_refresh: bool,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            name: None,
            start: start.into(),
            end: end.into(),
            auto_download: true,
            expired_check: true,
            account_refresh: true,
        }
    }

    pub fn with_permission(mut self, class: JobClass, allowed: bool) -> Self {
        match class {
            JobClass::AutoDownload => self.auto_download = allowed,
            JobClass::ExpiredCheck => self.expired_check = allowed,
            JobClass::AccountRefresh => self.account_refresh = allowed,
            JobClass::Eviction => {}
        }
        self
    }

    /// Whether `minute` (of day) falls in `[start, end)`, wrapping midnight
    /// when start is after end. Malformed bounds never contain anything.
    pub fn contains(&self, minute: u32) -> bool {
        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            return false;
        };
        if start <= end {
            start <= minute && minute < end
        } else {
            minute >= start || minute < end
        }
    }

    pub fn permits(&self, class: JobClass) -> bool {
        match class {
            JobClass::AutoDownload => self.auto_download,
            JobClass::ExpiredCheck => self.expired_check,
            JobClass::AccountRefresh => self.account_refresh,
            JobClass::Eviction => true,
        }
    }
}

/// Operator time-window policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// IANA zone the window times are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            timezone: default_timezone(),
            windows: Vec::new(),
        }
    }
}

impl SchedulePolicy {
    /// Check the timezone and window bounds. `Err` names the bad field.
    pub fn validate(&self) -> Result<(), String> {
        if self.timezone.parse::<Tz>().is_err() {
            return Err(format!("timezone is not a known timezone: {:?}", self.timezone));
        }
        for (i, window) in self.windows.iter().enumerate() {
            for (field, value) in [("start", &window.start), ("end", &window.end)] {
                if parse_hhmm(value).is_none() {
                    return Err(format!(
                        "windows[{}].{} must be HH:MM, got {:?}",
                        i, field, value
                    ));
                }
            }
        }
        Ok(())
    }

    fn minute_of_day(&self, now: DateTime<Utc>) -> u32 {
        let tz: Tz = self.timezone.parse().unwrap_or(Tz::UTC);
        let local = now.with_timezone(&tz);
        local.hour() * 60 + local.minute()
    }

    /// First window containing `now`, if the policy is active.
    pub fn current_window(&self, now: DateTime<Utc>) -> Option<&TimeWindow> {
        if !self.enabled {
            return None;
        }
        let minute = self.minute_of_day(now);
        self.windows.iter().find(|w| w.contains(minute))
    }

    /// Whether `class` may run at `now`.
    ///
    /// Disabled policy, empty window list, or no matching window all allow.
    /// Otherwise the first matching window decides.
    pub fn allowed(&self, class: JobClass, now: DateTime<Utc>) -> bool {
        if !class.is_gated() || !self.enabled || self.windows.is_empty() {
            return true;
        }
        self.current_window(now)
            .map(|w| w.permits(class))
            .unwrap_or(true)
    }
}

/// Free-function form of [`SchedulePolicy::allowed`].
pub fn allowed(policy: &SchedulePolicy, class: JobClass, now: DateTime<Utc>) -> bool {
    policy.allowed(class, now)
}

/// Parse `HH:MM` into minute of day. `24:00` maps to 1440.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (h, m) = value.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    match (h, m) {
        (24, 0) => Some(1440),
        (0..=23, 0..=59) => Some(h * 60 + m),
        _ => None,
    }
}
