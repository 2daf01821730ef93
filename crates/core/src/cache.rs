//! Bounded in-process TTL cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Counters for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// TTL cache keyed by request fingerprints.
///
/// Expired entries are dropped lazily on read and in bulk by [`sweep`].
/// When full, the least recently used entry makes room for the new one.
///
/// [`sweep`]: TtlCache::sweep
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let now = Instant::now();
        let looked_up = entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));
        let live = match looked_up {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => None,
        };
        let counter = if live.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        live
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let key = key.into();
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        // `push` hands back the displaced LRU entry, or the old value for
        // an existing key.
        if let Some((displaced, _)) = entries.push(key.clone(), entry) {
            if displaced != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|mut e| e.pop(key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        self.evictions
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Stable SHA-256 key over ordered parts.
pub fn fingerprint<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}
