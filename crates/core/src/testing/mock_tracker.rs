//! Mock tracker client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{fixtures, lock};
use crate::tracker::{
    Credentials, ItemDetail, Profile, SearchPage, SearchRequest, TrackerClient, TrackerError,
};
use crate::tracker::TrackerItem;

/// Controllable tracker.
///
/// - `search` returns the configured listing regardless of filters
/// - `fetch_bytes` returns a configured payload, or a generated `.torrent`
///   named after the item id
/// - every call is counted
#[derive(Debug, Default)]
pub struct MockTracker {
    items: Mutex<Vec<TrackerItem>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    profile: Mutex<Profile>,
    searches: Mutex<Vec<SearchRequest>>,
    search_error: Mutex<Option<String>>,
    fetch_errors: Mutex<Vec<String>>,
    profile_error: Mutex<Option<String>>,
    fetches: AtomicUsize,
    profiles: AtomicUsize,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_items(&self, items: Vec<TrackerItem>) {
        *lock(&self.items) = items;
    }

    pub fn set_payload(&self, item_id: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.payloads).insert(item_id.into(), bytes);
    }

    pub fn set_profile(&self, profile: Profile) {
        *lock(&self.profile) = profile;
    }

    pub fn fail_next_search(&self, message: impl Into<String>) {
        *lock(&self.search_error) = Some(message.into());
    }

    /// Make every fetch of `item_id` fail.
    pub fn fail_fetch(&self, item_id: impl Into<String>) {
        lock(&self.fetch_errors).push(item_id.into());
    }

    pub fn fail_profile(&self, message: impl Into<String>) {
        *lock(&self.profile_error) = Some(message.into());
    }

    pub fn search_count(&self) -> usize {
        lock(&self.searches).len()
    }

    /// Recorded search requests.
    pub fn searches(&self) -> Vec<SearchRequest> {
        lock(&self.searches).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackerClient for MockTracker {
    async fn search(
        &self,
        _creds: &Credentials,
        request: &SearchRequest,
    ) -> Result<SearchPage, TrackerError> {
        lock(&self.searches).push(request.clone());
        if let Some(message) = lock(&self.search_error).take() {
            return Err(TrackerError::Unavailable(message));
        }
        let items = lock(&self.items).clone();
        Ok(SearchPage {
            total: items.len() as u64,
            items,
        })
    }

    async fn fetch_bytes(
        &self,
        _creds: &Credentials,
        item_id: &str,
    ) -> Result<Vec<u8>, TrackerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if lock(&self.fetch_errors).iter().any(|id| id == item_id) {
            return Err(TrackerError::Api(format!("no download token for {}", item_id)));
        }
        Ok(lock(&self.payloads)
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| fixtures::torrent_bytes(&format!("item-{}", item_id), 4096)))
    }

    async fn profile(&self, _creds: &Credentials) -> Result<Profile, TrackerError> {
        self.profiles.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.profile_error).take() {
            return Err(TrackerError::Unauthorized(message));
        }
        Ok(lock(&self.profile).clone())
    }

    async fn detail(&self, _creds: &Credentials, item_id: &str) -> Result<ItemDetail, TrackerError> {
        let item = lock(&self.items)
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .ok_or_else(|| TrackerError::Api(format!("item {} not found", item_id)))?;
        let raw = serde_json::to_value(&item)
            .map_err(|e| TrackerError::MalformedResponse(e.to_string()))?;
        Ok(ItemDetail { item, raw })
    }
}
