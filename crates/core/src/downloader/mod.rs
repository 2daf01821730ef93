//! Download backend adapters.
//!
//! A [`DownloadBackend`] is chosen once per backend descriptor from its
//! [`BackendKind`](crate::directory::BackendKind); callers never branch on
//! the kind themselves.

mod pool;
mod qbittorrent;
mod transmission;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use pool::BackendPool;
pub use qbittorrent::QBittorrentClient;
pub use transmission::TransmissionClient;
pub use types::{
    AddRequest, BackendConnector, BackendStats, ConnectionState, DownloadBackend, DownloaderError,
    DownloaderTimeouts, ItemInfo, ItemLookup, ItemState,
};

use crate::directory::{Backend, BackendKind};

/// Build a client for `backend` and complete its login handshake.
pub async fn connect(
    backend: &Backend,
    timeouts: &DownloaderTimeouts,
) -> Result<Arc<dyn DownloadBackend>, DownloaderError> {
    let client: Arc<dyn DownloadBackend> = match backend.kind {
        BackendKind::QBittorrent => {
            let client = QBittorrentClient::new(backend, timeouts)?;
            client.login().await?;
            Arc::new(client)
        }
        BackendKind::Transmission => {
            let client = TransmissionClient::new(backend, timeouts)?;
            client.handshake().await?;
            Arc::new(client)
        }
    };

    info!(
        backend_id = %backend.id,
        kind = backend.kind.as_str(),
        url = %backend.base_url(),
        "connected to download backend"
    );
    Ok(client)
}

/// Connector that talks to real backends over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    timeouts: DownloaderTimeouts,
}

impl HttpConnector {
    pub fn new(timeouts: DownloaderTimeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl BackendConnector for HttpConnector {
    async fn connect(&self, backend: &Backend) -> Result<Arc<dyn DownloadBackend>, DownloaderError> {
        connect(backend, &self.timeouts).await
    }
}
