//! Cache of connected backend handles.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{BackendConnector, DownloadBackend, DownloaderError};
use crate::directory::Backend;

struct PooledHandle {
    fingerprint: String,
    handle: Arc<dyn DownloadBackend>,
}

/// Connected handles keyed by backend id.
///
/// A handle is reused while the descriptor's fingerprint is unchanged;
/// edits to address or credentials force a reconnect.
pub struct BackendPool {
    connector: Arc<dyn BackendConnector>,
    handles: Mutex<HashMap<String, PooledHandle>>,
}

impl BackendPool {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the handle for `backend`.
    pub async fn handle(
        &self,
        backend: &Backend,
    ) -> Result<Arc<dyn DownloadBackend>, DownloaderError> {
        let fingerprint = backend.fingerprint();
        {
            let handles = self.handles.lock().await;
            if let Some(pooled) = handles.get(&backend.id) {
                if pooled.fingerprint == fingerprint {
                    return Ok(Arc::clone(&pooled.handle));
                }
            }
        }

        debug!(backend_id = %backend.id, "connecting backend");
        let handle = self.connector.connect(backend).await?;

        let mut handles = self.handles.lock().await;
        handles.insert(
            backend.id.clone(),
            PooledHandle {
                fingerprint,
                handle: Arc::clone(&handle),
            },
        );
        Ok(handle)
    }

    /// Drop a cached handle so the next call reconnects.
    pub async fn invalidate(&self, backend_id: &str) {
        self.handles.lock().await.remove(backend_id);
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }
}
