//! Transmission RPC client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    AddRequest, BackendStats, ConnectionState, DownloadBackend, DownloaderError,
    DownloaderTimeouts, ItemInfo, ItemLookup, ItemState,
};
use crate::directory::{Backend, BackendKind};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

const ITEM_FIELDS: [&str; 9] = [
    "hashString",
    "name",
    "percentDone",
    "status",
    "totalSize",
    "downloadedEver",
    "labels",
    "addedDate",
    "error",
];

/// Transmission client bound to one backend descriptor.
pub struct TransmissionClient {
    client: Client,
    rpc_url: String,
    username: Option<String>,
    password: Option<String>,
    upload_timeout: Duration,
    session_id: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrTorrent {
    hash_string: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    percent_done: f64,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    downloaded_ever: i64,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    added_date: i64,
    #[serde(default)]
    error: i64,
}

impl TrTorrent {
    fn into_item_info(self) -> ItemInfo {
        let progress = (self.percent_done * 100.0).clamp(0.0, 100.0);
        ItemInfo {
            hash: self.hash_string.to_lowercase(),
            name: self.name,
            progress,
            native_state: native_status_name(self.status).to_string(),
            state: parse_tr_status(self.status, self.error, progress),
            size_bytes: self.total_size.max(0) as u64,
            downloaded_bytes: self.downloaded_ever.max(0) as u64,
            tags: self.labels,
            added_at: if self.added_date > 0 {
                Utc.timestamp_opt(self.added_date, 0).single()
            } else {
                None
            },
        }
    }
}

fn native_status_name(status: i64) -> &'static str {
    match status {
        0 => "stopped",
        1 => "check_wait",
        2 => "checking",
        3 => "download_wait",
        4 => "downloading",
        5 => "seed_wait",
        6 => "seeding",
        _ => "unknown",
    }
}

/// Map Transmission's numeric status onto [`ItemState`].
fn parse_tr_status(status: i64, error: i64, progress: f64) -> ItemState {
    let complete = progress >= 100.0;
    if error != 0 {
        return ItemState::Error;
    }
    match status {
        0 if complete => ItemState::Completed,
        0 => ItemState::Paused,
        1 | 2 if complete => ItemState::Seeding,
        1 | 2 => ItemState::Downloading,
        3 => ItemState::Queued,
        4 => ItemState::Downloading,
        5 | 6 => ItemState::Seeding,
        _ if complete => ItemState::Completed,
        _ => ItemState::Downloading,
    }
}

impl TransmissionClient {
    pub fn new(backend: &Backend, timeouts: &DownloaderTimeouts) -> Result<Self, DownloaderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()
            .map_err(|e| DownloaderError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            rpc_url: format!("{}/transmission/rpc", backend.base_url()),
            username: backend.username.clone().filter(|u| !u.is_empty()),
            password: backend.password.clone(),
            upload_timeout: Duration::from_secs(timeouts.upload_secs),
            session_id: RwLock::new(None),
        })
    }

    /// Perform the session handshake so later calls go straight through.
    pub async fn handshake(&self) -> Result<(), DownloaderError> {
        self.call("session-get", json!({ "fields": ["version"] }), None)
            .await
            .map(|_| ())
    }

    /// Issue one RPC call, refreshing the session id on 409.
    async fn call(
        &self,
        method: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, DownloaderError> {
        let body = json!({ "method": method, "arguments": arguments });

        for _ in 0..2 {
            let mut request = self.client.post(&self.rpc_url).json(&body);
            if let Some(ref user) = self.username {
                request = request.basic_auth(user, self.password.as_ref());
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            if let Some(ref id) = *self.session_id.read().await {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request.send().await.map_err(DownloaderError::from_reqwest)?;

            match response.status() {
                StatusCode::CONFLICT => {
                    let id = response
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            DownloaderError::MalformedResponse(
                                "409 without session id".to_string(),
                            )
                        })?;
                    debug!("refreshed Transmission session id");
                    *self.session_id.write().await = Some(id);
                    continue;
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(DownloaderError::AuthenticationFailed(format!(
                        "HTTP {}",
                        response.status()
                    )));
                }
                status if !status.is_success() => {
                    return Err(DownloaderError::Rejected(format!("HTTP {}", status)));
                }
                _ => {}
            }

            let parsed: RpcResponse = response
                .json()
                .await
                .map_err(|e| DownloaderError::MalformedResponse(e.to_string()))?;
            if parsed.result != "success" {
                return Err(DownloaderError::Rejected(parsed.result));
            }
            return Ok(parsed.arguments);
        }

        Err(DownloaderError::ConnectionFailed(
            "session id handshake did not converge".to_string(),
        ))
    }

    async fn torrents(&self, ids: Option<Vec<String>>) -> Result<Vec<ItemInfo>, DownloaderError> {
        let mut arguments = json!({ "fields": ITEM_FIELDS });
        if let Some(ids) = ids {
            arguments["ids"] = json!(ids);
        }
        let result = self.call("torrent-get", arguments, None).await?;
        let torrents: Vec<TrTorrent> = serde_json::from_value(
            result.get("torrents").cloned().unwrap_or(Value::Array(vec![])),
        )
        .map_err(|e| DownloaderError::MalformedResponse(e.to_string()))?;
        Ok(torrents.into_iter().map(TrTorrent::into_item_info).collect())
    }

    async fn free_space(&self) -> Result<Option<u64>, DownloaderError> {
        let session = self
            .call("session-get", json!({ "fields": ["download-dir"] }), None)
            .await?;
        let Some(dir) = session.get("download-dir").and_then(Value::as_str) else {
            return Ok(None);
        };
        let result = self
            .call("free-space", json!({ "path": dir }), None)
            .await?;
        Ok(result
            .get("size-bytes")
            .and_then(Value::as_i64)
            .map(|b| b.max(0) as u64))
    }
}

#[async_trait]
impl DownloadBackend for TransmissionClient {
    fn name(&self) -> &str {
        "transmission"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Transmission
    }

    async fn add(&self, request: AddRequest) -> Result<String, DownloaderError> {
        let mut arguments = json!({
            "metainfo": base64::engine::general_purpose::STANDARD.encode(&request.data),
        });
        if let Some(ref path) = request.save_path {
            arguments["download-dir"] = json!(path);
        }
        if !request.tags.is_empty() {
            arguments["labels"] = json!(request.tags);
        }

        let result = self
            .call("torrent-add", arguments, Some(self.upload_timeout))
            .await?;
        let added = result
            .get("torrent-added")
            .or_else(|| result.get("torrent-duplicate"))
            .and_then(|t| t.get("hashString"))
            .and_then(Value::as_str)
            .map(str::to_lowercase);

        match (added, request.expected_hash) {
            (Some(hash), _) => Ok(hash),
            (None, Some(hash)) => Ok(hash.to_lowercase()),
            (None, None) => Err(DownloaderError::MalformedResponse(
                "torrent-add returned no hash".to_string(),
            )),
        }
    }

    async fn remove(&self, hash: &str, purge: bool) -> Result<bool, DownloaderError> {
        let hash = hash.to_lowercase();
        if let ItemLookup::NotFound = self.info(&hash).await? {
            return Ok(false);
        }
        self.call(
            "torrent-remove",
            json!({ "ids": [hash], "delete-local-data": purge }),
            None,
        )
        .await?;
        Ok(true)
    }

    async fn info(&self, hash: &str) -> Result<ItemLookup, DownloaderError> {
        let found = self
            .torrents(Some(vec![hash.to_lowercase()]))
            .await?
            .into_iter()
            .next();
        Ok(match found {
            Some(info) => ItemLookup::Found(info),
            None => ItemLookup::NotFound,
        })
    }

    async fn list_active(&self) -> Result<Vec<ItemInfo>, DownloaderError> {
        let items = self.torrents(None).await?;
        Ok(items.into_iter().filter(|i| !i.is_complete()).collect())
    }

    async fn stats(&self) -> Result<BackendStats, DownloaderError> {
        let stats = self.call("session-stats", json!({}), None).await?;
        let free_bytes = self.free_space().await?;

        Ok(BackendStats {
            download_speed: stats
                .get("downloadSpeed")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .max(0) as u64,
            upload_speed: stats
                .get("uploadSpeed")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .max(0) as u64,
            free_bytes,
            connection: ConnectionState::Connected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tr_status() {
        assert_eq!(parse_tr_status(4, 0, 50.0), ItemState::Downloading);
        assert_eq!(parse_tr_status(3, 0, 0.0), ItemState::Queued);
        assert_eq!(parse_tr_status(0, 0, 20.0), ItemState::Paused);
        assert_eq!(parse_tr_status(0, 0, 100.0), ItemState::Completed);
        assert_eq!(parse_tr_status(6, 0, 100.0), ItemState::Seeding);
        assert_eq!(parse_tr_status(2, 0, 30.0), ItemState::Downloading);
        assert_eq!(parse_tr_status(4, 3, 30.0), ItemState::Error);
    }

    #[test]
    fn test_torrent_conversion() {
        let json = r#"{
            "hashString": "DEADBEEF",
            "name": "Some.Album.FLAC",
            "percentDone": 0.25,
            "status": 4,
            "totalSize": 800,
            "downloadedEver": 200,
            "labels": ["auto"],
            "addedDate": 1703980800,
            "error": 0
        }"#;
        let torrent: TrTorrent = serde_json::from_str(json).unwrap();
        let info = torrent.into_item_info();

        assert_eq!(info.hash, "deadbeef");
        assert!((info.progress - 25.0).abs() < 0.001);
        assert_eq!(info.native_state, "downloading");
        assert_eq!(info.state, ItemState::Downloading);
        assert_eq!(info.tags, vec!["auto"]);
        assert_eq!(info.downloaded_bytes, 200);
    }

    #[test]
    fn test_rpc_url() {
        let backend = Backend {
            id: "b".to_string(),
            name: "tr".to_string(),
            kind: BackendKind::Transmission,
            host: "nas.lan".to_string(),
            port: 9091,
            username: Some(String::new()),
            password: None,
            use_tls: true,
            active: true,
            created_at: Utc::now(),
        };
        let client = TransmissionClient::new(&backend, &DownloaderTimeouts::default()).unwrap();
        assert_eq!(client.rpc_url, "https://nas.lan:9091/transmission/rpc");
        assert!(client.username.is_none());
    }
}
