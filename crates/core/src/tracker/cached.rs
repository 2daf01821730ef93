//! Caching decorator for tracker clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{
    Credentials, ItemDetail, Profile, SearchPage, SearchRequest, TrackerClient, TrackerError,
};
use crate::cache::{fingerprint, CacheStats, TtlCache};
use crate::config::TrackerCacheConfig;

/// Wraps a [`TrackerClient`] with TTL caches for search and detail calls.
///
/// Payload downloads and profile reads always go to the tracker.
pub struct CachedTracker {
    inner: Arc<dyn TrackerClient>,
    search_cache: TtlCache<SearchPage>,
    detail_cache: TtlCache<ItemDetail>,
    search_ttl: Duration,
    detail_ttl: Duration,
}

impl CachedTracker {
    pub fn new(inner: Arc<dyn TrackerClient>, config: &TrackerCacheConfig) -> Self {
        Self {
            inner,
            search_cache: TtlCache::new(config.max_entries),
            detail_cache: TtlCache::new(config.max_entries),
            search_ttl: Duration::from_secs(config.search_ttl_secs),
            detail_ttl: Duration::from_secs(config.detail_ttl_secs),
        }
    }

    fn search_key(creds: &Credentials, request: &SearchRequest) -> String {
        let promotion = request.promotion.map(|p| p.as_str()).unwrap_or("");
        let page = request.page.to_string();
        let page_size = request.page_size.to_string();
        let categories = request.categories.join(",");
        fingerprint([
            "search",
            creds.fingerprint().as_str(),
            request.mode.as_str(),
            page.as_str(),
            page_size.as_str(),
            categories.as_str(),
            request.keyword.as_deref().unwrap_or(""),
            promotion,
        ])
    }

    fn detail_key(creds: &Credentials, item_id: &str) -> String {
        fingerprint(["detail", creds.fingerprint().as_str(), item_id])
    }

    /// Drop expired entries from both caches.
    pub fn sweep(&self) -> usize {
        self.search_cache.sweep() + self.detail_cache.sweep()
    }

    pub fn stats(&self) -> CacheStats {
        let s = self.search_cache.stats();
        let d = self.detail_cache.stats();
        CacheStats {
            entries: s.entries + d.entries,
            hits: s.hits + d.hits,
            misses: s.misses + d.misses,
            evictions: s.evictions + d.evictions,
        }
    }

    /// Periodically sweep until shutdown is signalled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = self.sweep();
                        if removed > 0 {
                            debug!(removed, "swept tracker cache");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl TrackerClient for CachedTracker {
    async fn search(
        &self,
        creds: &Credentials,
        request: &SearchRequest,
    ) -> Result<SearchPage, TrackerError> {
        let key = Self::search_key(creds, request);
        if let Some(page) = self.search_cache.get(&key) {
            return Ok(page);
        }
        let page = self.inner.search(creds, request).await?;
        self.search_cache.insert(key, page.clone(), self.search_ttl);
        Ok(page)
    }

    async fn fetch_bytes(
        &self,
        creds: &Credentials,
        item_id: &str,
    ) -> Result<Vec<u8>, TrackerError> {
        self.inner.fetch_bytes(creds, item_id).await
    }

    async fn profile(&self, creds: &Credentials) -> Result<Profile, TrackerError> {
        self.inner.profile(creds).await
    }

    async fn detail(
        &self,
        creds: &Credentials,
        item_id: &str,
    ) -> Result<ItemDetail, TrackerError> {
        let key = Self::detail_key(creds, item_id);
        if let Some(detail) = self.detail_cache.get(&key) {
            return Ok(detail);
        }
        let detail = self.inner.detail(creds, item_id).await?;
        self.detail_cache.insert(key, detail.clone(), self.detail_ttl);
        Ok(detail)
    }
}
