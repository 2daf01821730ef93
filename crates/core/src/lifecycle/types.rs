//! Acquisition record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecordState;
use crate::promotion::PromotionClass;

/// One row per item ever pushed or imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    pub id: String,
    /// Owning account; None for manual imports.
    pub account_id: Option<String>,
    /// Tracker item id.
    pub item_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub rule_id: Option<String>,
    pub backend_id: Option<String>,
    /// Lowercase hex info hash; immutable once set.
    pub info_hash: Option<String>,
    pub promotion_class: Option<PromotionClass>,
    pub promotion_ends_at: Option<DateTime<Utc>>,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub account_id: Option<String>,
    pub item_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub rule_id: Option<String>,
    pub backend_id: Option<String>,
    pub info_hash: Option<String>,
    pub promotion_class: Option<PromotionClass>,
    pub promotion_ends_at: Option<DateTime<Utc>>,
    /// Initial state: `pending`, `pushing` or `failed`.
    pub state: RecordState,
}

impl NewRecord {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            account_id: None,
            item_id: item_id.into(),
            name: name.into(),
            size_bytes,
            rule_id: None,
            backend_id: None,
            info_hash: None,
            promotion_class: None,
            promotion_ends_at: None,
            state: RecordState::Pending,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.info_hash = Some(hash.into());
        self
    }

    pub fn with_promotion(
        mut self,
        class: Option<PromotionClass>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.promotion_class = class;
        self.promotion_ends_at = ends_at;
        self
    }

    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = state;
        self
    }
}

/// Filter for querying records.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    /// Any of these states; empty means all.
    pub states: Vec<RecordState>,
    pub backend_id: Option<String>,
    pub account_id: Option<String>,
    pub rule_id: Option<String>,
    /// Only records with a content hash.
    pub has_hash: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFilter {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            backend_id: None,
            account_id: None,
            rule_id: None,
            has_hash: false,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: RecordState) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = RecordState>) -> Self {
        self.states.extend(states);
        self
    }

    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_hash_only(mut self) -> Self {
        self.has_hash = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}
