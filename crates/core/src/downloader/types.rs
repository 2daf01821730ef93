//! Types for download backend operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::{Backend, BackendKind};

/// Errors that can occur during download backend operations.
#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request timeout")]
    Timeout,
}

impl DownloaderError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloaderError::Timeout
        } else if e.is_connect() {
            DownloaderError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            DownloaderError::MalformedResponse(e.to_string())
        } else {
            DownloaderError::Rejected(e.to_string())
        }
    }
}

/// Normalized item state across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Downloading,
    Paused,
    Queued,
    Seeding,
    Completed,
    Error,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Downloading => "downloading",
            ItemState::Paused => "paused",
            ItemState::Queued => "queued",
            ItemState::Seeding => "seeding",
            ItemState::Completed => "completed",
            ItemState::Error => "error",
        }
    }
}

/// Live status of one item on a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    pub name: String,
    /// Percent complete, 0..=100.
    pub progress: f64,
    /// Backend's own state string.
    pub native_state: String,
    pub state: ItemState,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Bytes on disk so far.
    pub downloaded_bytes: u64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl ItemInfo {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100.0
    }
}

/// Result of looking an item up by hash.
#[derive(Debug, Clone)]
pub enum ItemLookup {
    Found(ItemInfo),
    NotFound,
}

/// Backend connection status as reported by the backend itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Firewalled,
    Disconnected,
    Unknown,
}

/// Aggregate transfer and disk stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStats {
    /// Bytes per second.
    pub download_speed: u64,
    pub upload_speed: u64,
    /// Free space in the default download directory, when reported.
    pub free_bytes: Option<u64>,
    pub connection: ConnectionState,
}

/// Request to add a `.torrent` payload.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub data: Vec<u8>,
    pub save_path: Option<String>,
    pub tags: Vec<String>,
    /// Hash computed from the payload, if known.
    pub expected_hash: Option<String>,
}

impl AddRequest {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            save_path: None,
            tags: Vec::new(),
            expected_hash: None,
        }
    }

    pub fn with_save_path(mut self, path: impl Into<String>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }
}

/// Uniform interface over download backends.
///
/// Every call is fallible; callers treat errors as per-unit failures.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Implementation name for logging.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Add a payload. Returns the lowercase info hash.
    async fn add(&self, request: AddRequest) -> Result<String, DownloaderError>;

    /// Remove an item. Returns false when the backend did not know it.
    async fn remove(&self, hash: &str, purge: bool) -> Result<bool, DownloaderError>;

    async fn info(&self, hash: &str) -> Result<ItemLookup, DownloaderError>;

    /// Items that are not complete yet.
    async fn list_active(&self) -> Result<Vec<ItemInfo>, DownloaderError>;

    async fn stats(&self) -> Result<BackendStats, DownloaderError>;
}

/// Per-call timeouts for backend clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloaderTimeouts {
    /// Status polls and small requests.
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
    /// Payload uploads.
    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,
}

fn default_request_secs() -> u64 {
    5
}

fn default_upload_secs() -> u64 {
    30
}

impl Default for DownloaderTimeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request_secs(),
            upload_secs: default_upload_secs(),
        }
    }
}

/// Builds connected handles from backend descriptors.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(
        &self,
        backend: &Backend,
    ) -> Result<std::sync::Arc<dyn DownloadBackend>, DownloaderError>;
}
