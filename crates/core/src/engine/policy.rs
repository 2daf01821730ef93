//! Auto-delete policy: promotion expiry and capacity eviction.

use serde::{Deserialize, Serialize};

use crate::directory::RuleMode;

/// Which rule modes a deletion may touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    #[default]
    All,
    Normal,
    Adult,
}

impl DeleteScope {
    pub fn includes(&self, mode: RuleMode) -> bool {
        match self {
            DeleteScope::All => true,
            DeleteScope::Normal => mode == RuleMode::Normal,
            DeleteScope::Adult => mode == RuleMode::Adult,
        }
    }
}

/// Candidate ordering for capacity eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    #[default]
    OldestFirst,
    NewestFirst,
    LargestFirst,
    SmallestFirst,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::OldestFirst => "oldest_first",
            EvictionStrategy::NewestFirst => "newest_first",
            EvictionStrategy::LargestFirst => "largest_first",
            EvictionStrategy::SmallestFirst => "smallest_first",
        }
    }
}

/// How much space removing an item is assumed to reclaim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBasis {
    /// Full declared item size.
    #[default]
    Declared,
    /// Bytes already written to disk.
    Downloaded,
}

/// Dynamic deletion when backend free space runs low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// The one backend whose free space is watched.
    #[serde(default)]
    pub backend_id: Option<String>,
    /// Eviction starts when free space drops below this.
    #[serde(default = "default_high")]
    pub high_threshold_bytes: u64,
    /// Eviction reclaims until free space would reach this.
    #[serde(default = "default_low")]
    pub low_threshold_bytes: u64,
    #[serde(default)]
    pub strategy: EvictionStrategy,
    #[serde(default)]
    pub size_basis: SizeBasis,
    /// Also evict backend items no record tracks. Rule and tag filters
    /// do not apply to them.
    #[serde(default = "default_true")]
    pub include_untracked: bool,
}

const GB: u64 = 1024 * 1024 * 1024;

fn default_high() -> u64 {
    1000 * GB
}

fn default_low() -> u64 {
    800 * GB
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            backend_id: None,
            high_threshold_bytes: default_high(),
            low_threshold_bytes: default_low(),
            strategy: EvictionStrategy::default(),
            size_basis: SizeBasis::default(),
            include_untracked: true,
        }
    }
}

impl CapacityPolicy {
    /// Enabled and bound to a backend.
    pub fn is_active(&self) -> bool {
        self.enabled && self.backend_id.as_deref().is_some_and(|b| !b.is_empty())
    }
}

/// Auto-delete settings shared by the expiry and eviction jobs.
///
/// `enabled` turns the expiry job on; `capacity.enabled` turns eviction on.
/// Both honor `scope` and `check_tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoDeletePolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub scope: DeleteScope,
    #[serde(default = "default_true")]
    pub check_tags: bool,
    #[serde(default)]
    pub capacity: CapacityPolicy,
}

fn default_true() -> bool {
    true
}

impl AutoDeletePolicy {
    /// Check thresholds and backend binding. `Err` names the bad field.
    pub fn validate(&self) -> Result<(), String> {
        let capacity = &self.capacity;
        if capacity.low_threshold_bytes > capacity.high_threshold_bytes {
            return Err(
                "capacity.low_threshold_bytes cannot exceed high_threshold_bytes".to_string(),
            );
        }
        if capacity.enabled && !capacity.is_active() {
            return Err(
                "capacity.backend_id is required when capacity eviction is enabled".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for AutoDeletePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: DeleteScope::All,
            check_tags: true,
            capacity: CapacityPolicy::default(),
        }
    }
}
