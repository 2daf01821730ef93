//! Mock download backend and connector.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use super::lock;
use crate::directory::{Backend, BackendKind};
use crate::downloader::{
    AddRequest, BackendConnector, BackendStats, ConnectionState, DownloadBackend,
    DownloaderError, ItemInfo, ItemLookup, ItemState,
};
use crate::torrent_meta;

/// In-memory download backend.
///
/// Items live in a map keyed by hash. `add` parses the payload to get its
/// hash, so pushes from the acquisition job show up in `list_active`.
#[derive(Debug, Default)]
pub struct MockDownloadBackend {
    items: Mutex<BTreeMap<String, ItemInfo>>,
    free_bytes: Mutex<Option<u64>>,
    added: Mutex<Vec<AddRequest>>,
    removed: Mutex<Vec<(String, bool)>>,
    /// If set, the next `add` fails with this message.
    add_error: Mutex<Option<String>>,
    /// Hashes whose removal fails.
    remove_errors: Mutex<Vec<String>>,
    /// Hashes that disappear just before `remove` reaches them.
    vanish_on_remove: Mutex<Vec<String>>,
    /// If set, every call fails with a connection error.
    offline: Mutex<bool>,
}

impl MockDownloadBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an item on the backend.
    pub fn insert(&self, info: ItemInfo) {
        lock(&self.items).insert(info.hash.clone(), info);
    }

    pub fn set_progress(&self, hash: &str, progress: f64) {
        if let Some(item) = lock(&self.items).get_mut(hash) {
            item.progress = progress;
            if progress >= 100.0 {
                item.state = ItemState::Seeding;
                item.downloaded_bytes = item.size_bytes;
            }
        }
    }

    pub fn set_state(&self, hash: &str, state: ItemState) {
        if let Some(item) = lock(&self.items).get_mut(hash) {
            item.state = state;
            item.native_state = state.as_str().to_string();
        }
    }

    pub fn set_free_bytes(&self, free: Option<u64>) {
        *lock(&self.free_bytes) = free;
    }

    pub fn fail_next_add(&self, message: impl Into<String>) {
        *lock(&self.add_error) = Some(message.into());
    }

    pub fn fail_remove(&self, hash: impl Into<String>) {
        lock(&self.remove_errors).push(hash.into());
    }

    /// Make `remove` report `hash` as already gone.
    pub fn vanish_on_remove(&self, hash: impl Into<String>) {
        lock(&self.vanish_on_remove).push(hash.into());
    }

    pub fn set_offline(&self, offline: bool) {
        *lock(&self.offline) = offline;
    }

    pub fn contains(&self, hash: &str) -> bool {
        lock(&self.items).contains_key(hash)
    }

    /// Recorded `add` calls.
    pub fn added(&self) -> Vec<AddRequest> {
        lock(&self.added).clone()
    }

    /// Recorded `remove` calls as (hash, purge).
    pub fn removed(&self) -> Vec<(String, bool)> {
        lock(&self.removed).clone()
    }

    fn check_online(&self) -> Result<(), DownloaderError> {
        if *lock(&self.offline) {
            return Err(DownloaderError::ConnectionFailed("mock offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadBackend for MockDownloadBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::QBittorrent
    }

    async fn add(&self, request: AddRequest) -> Result<String, DownloaderError> {
        self.check_online()?;
        if let Some(message) = lock(&self.add_error).take() {
            return Err(DownloaderError::Rejected(message));
        }
        let meta = torrent_meta::inspect(&request.data)
            .map_err(|e| DownloaderError::InvalidTorrent(e.to_string()))?;

        let info = ItemInfo {
            hash: meta.info_hash.clone(),
            name: meta.name.clone().unwrap_or_default(),
            progress: 0.0,
            native_state: "downloading".to_string(),
            state: ItemState::Downloading,
            size_bytes: meta.total_size,
            downloaded_bytes: 0,
            tags: request.tags.clone(),
            added_at: Some(Utc::now()),
        };
        lock(&self.items).insert(meta.info_hash.clone(), info);
        lock(&self.added).push(request);
        Ok(meta.info_hash)
    }

    async fn remove(&self, hash: &str, purge: bool) -> Result<bool, DownloaderError> {
        self.check_online()?;
        lock(&self.removed).push((hash.to_string(), purge));
        if lock(&self.remove_errors).iter().any(|h| h == hash) {
            return Err(DownloaderError::Rejected(format!("cannot remove {}", hash)));
        }
        if lock(&self.vanish_on_remove).iter().any(|h| h == hash) {
            lock(&self.items).remove(hash);
            return Ok(false);
        }
        Ok(lock(&self.items).remove(hash).is_some())
    }

    async fn info(&self, hash: &str) -> Result<ItemLookup, DownloaderError> {
        self.check_online()?;
        Ok(match lock(&self.items).get(hash) {
            Some(info) => ItemLookup::Found(info.clone()),
            None => ItemLookup::NotFound,
        })
    }

    async fn list_active(&self) -> Result<Vec<ItemInfo>, DownloaderError> {
        self.check_online()?;
        Ok(lock(&self.items)
            .values()
            .filter(|i| !i.is_complete())
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<BackendStats, DownloaderError> {
        self.check_online()?;
        Ok(BackendStats {
            download_speed: 0,
            upload_speed: 0,
            free_bytes: *lock(&self.free_bytes),
            connection: ConnectionState::Connected,
        })
    }
}

/// Hands out one [`MockDownloadBackend`] per backend id.
#[derive(Debug, Default)]
pub struct MockConnector {
    backends: Mutex<HashMap<String, Arc<MockDownloadBackend>>>,
    connects: AtomicUsize,
    /// If set, the next connect fails with this message.
    next_error: Mutex<Option<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mock behind `backend_id`, created on first use.
    pub fn backend(&self, backend_id: &str) -> Arc<MockDownloadBackend> {
        Arc::clone(
            lock(&self.backends)
                .entry(backend_id.to_string())
                .or_default(),
        )
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, message: impl Into<String>) {
        *lock(&self.next_error) = Some(message.into());
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self, backend: &Backend) -> Result<Arc<dyn DownloadBackend>, DownloaderError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.next_error).take() {
            return Err(DownloaderError::ConnectionFailed(message));
        }
        let handle: Arc<dyn DownloadBackend> = self.backend(&backend.id);
        Ok(handle)
    }
}
