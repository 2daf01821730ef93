//! Types for tracker operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::directory::RuleMode;
use crate::promotion::PromotionClass;

/// Errors from tracker calls.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker unreachable: {0}")]
    Unavailable(String),

    #[error("tracker rejected credentials: {0}")]
    Unauthorized(String),

    /// The tracker answered with a non-success envelope.
    #[error("tracker error: {0}")]
    Api(String),

    #[error("malformed tracker response: {0}")]
    MalformedResponse(String),

    #[error("request timeout")]
    Timeout,
}

impl TrackerError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TrackerError::Timeout
        } else if e.is_decode() {
            TrackerError::MalformedResponse(e.to_string())
        } else {
            TrackerError::Unavailable(e.to_string())
        }
    }
}

/// Credential used to act as an account.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Digest that identifies the credential without exposing it.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.api_key.as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Promotion filter pushed down to the search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionFilter {
    Free,
    DoubleUpload,
}

impl PromotionFilter {
    /// Tracker wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionFilter::Free => "FREE",
            PromotionFilter::DoubleUpload => "_2X",
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub page: u32,
    pub page_size: u32,
    pub mode: RuleMode,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub promotion: Option<PromotionFilter>,
}

impl SearchRequest {
    pub fn new(mode: RuleMode) -> Self {
        Self {
            page: 1,
            page_size: 50,
            mode,
            categories: Vec::new(),
            keyword: None,
            promotion: None,
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_promotion(mut self, promotion: Option<PromotionFilter>) -> Self {
        self.promotion = promotion;
        self
    }
}

/// A tracker listing as returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerItem {
    pub id: String,
    pub name: String,
    /// Subtitle / short description.
    pub description: Option<String>,
    pub category: Option<String>,
    pub size_bytes: u64,
    pub seeders: u32,
    pub leechers: u32,
    pub promotion: PromotionClass,
    pub promotion_ends_at: Option<DateTime<Utc>>,
}

impl TrackerItem {
    /// Size in GiB rounded to two decimals, the unit rule bounds use.
    pub fn size_gb(&self) -> f64 {
        let gb = self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        (gb * 100.0).round() / 100.0
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub total: u64,
    pub items: Vec<TrackerItem>,
}

/// Account traffic summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: Option<String>,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub ratio: f64,
    pub bonus: f64,
}

/// Item metadata from the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub item: TrackerItem,
    /// Raw payload for fields the engine does not model.
    pub raw: serde_json::Value,
}

/// Uniform interface to the tracker site.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn search(
        &self,
        creds: &Credentials,
        request: &SearchRequest,
    ) -> Result<SearchPage, TrackerError>;

    /// Download the `.torrent` payload for an item.
    async fn fetch_bytes(&self, creds: &Credentials, item_id: &str)
        -> Result<Vec<u8>, TrackerError>;

    async fn profile(&self, creds: &Credentials) -> Result<Profile, TrackerError>;

    async fn detail(&self, creds: &Credentials, item_id: &str)
        -> Result<ItemDetail, TrackerError>;
}
