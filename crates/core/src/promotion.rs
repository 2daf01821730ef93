//! Tracker promotion classes and promotion window arithmetic.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Discount class attached to a tracker listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PromotionClass {
    /// No promotion.
    Normal,
    /// Download does not count.
    Free,
    /// Half the download counts.
    Percent50,
    /// Free with double upload.
    DoubleFree,
    /// Half download with double upload.
    DoublePercent50,
    /// Double upload only.
    Double,
    /// Anything the tracker adds later.
    Other(String),
}

impl PromotionClass {
    /// Tracker wire value.
    pub fn as_str(&self) -> &str {
        match self {
            PromotionClass::Normal => "NORMAL",
            PromotionClass::Free => "FREE",
            PromotionClass::Percent50 => "PERCENT_50",
            PromotionClass::DoubleFree => "_2X_FREE",
            PromotionClass::DoublePercent50 => "_2X_PERCENT_50",
            PromotionClass::Double => "_2X",
            PromotionClass::Other(raw) => raw,
        }
    }

    /// Download traffic is not accounted.
    pub fn is_free(&self) -> bool {
        matches!(self, PromotionClass::Free | PromotionClass::DoubleFree)
    }

    /// Upload traffic is doubled.
    pub fn is_double_upload(&self) -> bool {
        matches!(
            self,
            PromotionClass::Double | PromotionClass::DoubleFree | PromotionClass::DoublePercent50
        )
    }
}

impl From<String> for PromotionClass {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "NORMAL" => PromotionClass::Normal,
            "FREE" => PromotionClass::Free,
            "PERCENT_50" => PromotionClass::Percent50,
            "_2X_FREE" => PromotionClass::DoubleFree,
            "_2X_PERCENT_50" => PromotionClass::DoublePercent50,
            "_2X" => PromotionClass::Double,
            _ => PromotionClass::Other(value),
        }
    }
}

impl From<&str> for PromotionClass {
    fn from(value: &str) -> Self {
        PromotionClass::from(value.to_string())
    }
}

impl From<PromotionClass> for String {
    fn from(value: PromotionClass) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PromotionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an in-flight item should be cleaned up: its promotion window
/// has closed, or its class was never free. Items with no promotion
/// metadata at all are left alone.
pub fn needs_expiry(
    class: Option<&PromotionClass>,
    ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if ends_at.is_some_and(|end| end < now) {
        return true;
    }
    class.is_some_and(|c| !c.is_free())
}

/// Parse a promotion end time as the tracker reports it.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` in the tracker's local zone, and
/// epoch timestamps (milliseconds when larger than 1e10, else seconds).
pub fn parse_promotion_end(raw: &str, tracker_tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(epoch) = raw.parse::<i64>() {
        return from_epoch(epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tracker_tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert an epoch value that may be seconds or milliseconds.
pub fn from_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    if epoch > 10_000_000_000 {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}
