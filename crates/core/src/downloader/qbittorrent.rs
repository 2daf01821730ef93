//! qBittorrent WebUI API v2 client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    AddRequest, BackendStats, ConnectionState, DownloadBackend, DownloaderError,
    DownloaderTimeouts, ItemInfo, ItemLookup, ItemState,
};
use crate::directory::{Backend, BackendKind};
use crate::torrent_meta;

/// qBittorrent client bound to one backend descriptor.
pub struct QBittorrentClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    upload_timeout: Duration,
    /// Set after a successful login; the cookie itself lives in the jar.
    session: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl QBittorrentClient {
    pub fn new(backend: &Backend, timeouts: &DownloaderTimeouts) -> Result<Self, DownloaderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| DownloaderError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: backend.base_url(),
            username: backend.username.clone().unwrap_or_default(),
            password: backend.password.clone().unwrap_or_default(),
            upload_timeout: Duration::from_secs(timeouts.upload_secs),
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Login and remember that the cookie jar holds a session.
    pub async fn login(&self) -> Result<(), DownloaderError> {
        let url = format!("{}/api/v2/auth/login", self.base_url);
        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Referer", &self.base_url)
            .form(&params)
            .send()
            .await
            .map_err(DownloaderError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!(url = %self.base_url, "qBittorrent login successful");
            *self.session.write().await = Some(Utc::now());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(DownloaderError::AuthenticationFailed(
                "invalid credentials".to_string(),
            ))
        } else {
            Err(DownloaderError::AuthenticationFailed(format!(
                "unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloaderError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, re-logging once on 403.
    async fn send<F>(&self, build: F) -> Result<String, DownloaderError>
    where
        F: Fn() -> Result<RequestBuilder, DownloaderError>,
    {
        self.ensure_authenticated().await?;

        let mut response = build()?
            .send()
            .await
            .map_err(DownloaderError::from_reqwest)?;

        if response.status().as_u16() == 403 {
            warn!(url = %self.base_url, "qBittorrent session expired, re-authenticating");
            *self.session.write().await = None;
            self.login().await?;
            response = build()?
                .send()
                .await
                .map_err(DownloaderError::from_reqwest)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(DownloaderError::Rejected(format!("HTTP {}", status)));
        }

        response.text().await.map_err(DownloaderError::from_reqwest)
    }

    async fn get(&self, endpoint: &str) -> Result<String, DownloaderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.send(|| Ok(self.client.get(&url))).await
    }

    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DownloaderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.send(|| Ok(self.client.post(&url).form(params))).await
    }

    /// Create any of `tags` the backend does not know yet.
    async fn ensure_tags(&self, tags: &[String]) -> Result<(), DownloaderError> {
        if tags.is_empty() {
            return Ok(());
        }
        let body = self.get("/api/v2/torrents/tags").await?;
        let existing: Vec<String> = serde_json::from_str(&body)
            .map_err(|e| DownloaderError::MalformedResponse(e.to_string()))?;

        let missing: Vec<&str> = tags
            .iter()
            .filter(|t| !existing.contains(t))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let joined = missing.join(",");
        debug!(tags = %joined, "creating qBittorrent tags");
        self.post_form("/api/v2/torrents/createTags", &[("tags", &joined)])
            .await?;
        Ok(())
    }

    async fn query_info(&self, endpoint: &str) -> Result<Vec<ItemInfo>, DownloaderError> {
        let body = self.get(endpoint).await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| DownloaderError::MalformedResponse(e.to_string()))?;
        Ok(torrents.into_iter().map(QBTorrentInfo::into_item_info).collect())
    }
}

/// Subset of `torrents/info` entries.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    size: i64,
    #[serde(default)]
    downloaded: i64,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    added_on: i64,
}

impl QBTorrentInfo {
    fn into_item_info(self) -> ItemInfo {
        let progress = (self.progress * 100.0).clamp(0.0, 100.0);
        ItemInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            progress,
            state: parse_qb_state(&self.state, progress),
            native_state: self.state,
            size_bytes: self.size.max(0) as u64,
            downloaded_bytes: self.downloaded.max(0) as u64,
            tags: split_tags(&self.tags),
            added_at: timestamp_to_datetime(self.added_on),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QBMainData {
    #[serde(default)]
    server_state: Option<QBServerState>,
}

#[derive(Debug, Deserialize)]
struct QBServerState {
    #[serde(default)]
    dl_info_speed: i64,
    #[serde(default)]
    up_info_speed: i64,
    #[serde(default)]
    free_space_on_disk: Option<i64>,
    #[serde(default)]
    connection_status: Option<String>,
}

/// Map qBittorrent's state vocabulary onto [`ItemState`].
fn parse_qb_state(state: &str, progress: f64) -> ItemState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" | "stalledDL"
        | "checkingDL" => ItemState::Downloading,
        "uploading" | "forcedUP" | "stalledUP" | "checkingUP" => ItemState::Seeding,
        "pausedDL" | "stoppedDL" => ItemState::Paused,
        "pausedUP" | "stoppedUP" => ItemState::Completed,
        "queuedDL" => ItemState::Queued,
        "queuedUP" => ItemState::Seeding,
        "error" | "missingFiles" => ItemState::Error,
        _ if progress >= 100.0 => ItemState::Completed,
        _ => ItemState::Downloading,
    }
}

fn parse_connection_status(status: Option<&str>) -> ConnectionState {
    match status {
        Some("connected") => ConnectionState::Connected,
        Some("firewalled") => ConnectionState::Firewalled,
        Some("disconnected") => ConnectionState::Disconnected,
        _ => ConnectionState::Unknown,
    }
}

/// qBittorrent reports tags as `"a, b"`.
fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl DownloadBackend for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::QBittorrent
    }

    async fn add(&self, request: AddRequest) -> Result<String, DownloaderError> {
        let hash = match request.expected_hash {
            Some(ref hash) => hash.to_lowercase(),
            None => {
                torrent_meta::inspect(&request.data)
                    .map_err(|e| DownloaderError::InvalidTorrent(e.to_string()))?
                    .info_hash
            }
        };

        self.ensure_tags(&request.tags).await?;

        let url = format!("{}/api/v2/torrents/add", self.base_url);
        let tags = request.tags.join(",");
        let body = self
            .send(|| {
                let part = multipart::Part::bytes(request.data.clone())
                    .file_name(format!("{}.torrent", hash))
                    .mime_str("application/x-bittorrent")
                    .map_err(|e| DownloaderError::InvalidTorrent(e.to_string()))?;

                let mut form = multipart::Form::new().part("torrents", part);
                if let Some(ref path) = request.save_path {
                    form = form.text("savepath", path.clone());
                }
                if !tags.is_empty() {
                    form = form.text("tags", tags.clone());
                }
                Ok(self
                    .client
                    .post(&url)
                    .timeout(self.upload_timeout)
                    .multipart(form))
            })
            .await?;

        if body.contains("Fails.") {
            return Err(DownloaderError::Rejected(format!(
                "qBittorrent refused torrent {}",
                hash
            )));
        }

        debug!(hash = %hash, "torrent added to qBittorrent");
        Ok(hash)
    }

    async fn remove(&self, hash: &str, purge: bool) -> Result<bool, DownloaderError> {
        let hash = hash.to_lowercase();
        if let ItemLookup::NotFound = self.info(&hash).await? {
            return Ok(false);
        }

        let delete_files = if purge { "true" } else { "false" };
        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", &hash), ("deleteFiles", delete_files)],
        )
        .await?;
        Ok(true)
    }

    async fn info(&self, hash: &str) -> Result<ItemLookup, DownloaderError> {
        let endpoint = format!(
            "/api/v2/torrents/info?hashes={}",
            urlencoding::encode(&hash.to_lowercase())
        );
        let item = self.query_info(&endpoint).await?.into_iter().next();
        Ok(match item {
            Some(info) => ItemLookup::Found(info),
            None => ItemLookup::NotFound,
        })
    }

    async fn list_active(&self) -> Result<Vec<ItemInfo>, DownloaderError> {
        let items = self
            .query_info("/api/v2/torrents/info?filter=downloading")
            .await?;
        Ok(items.into_iter().filter(|i| !i.is_complete()).collect())
    }

    async fn stats(&self) -> Result<BackendStats, DownloaderError> {
        let body = self.get("/api/v2/sync/maindata?rid=0").await?;
        let data: QBMainData = serde_json::from_str(&body)
            .map_err(|e| DownloaderError::MalformedResponse(e.to_string()))?;
        let state = data.server_state.ok_or_else(|| {
            DownloaderError::MalformedResponse("maindata without server_state".to_string())
        })?;

        Ok(BackendStats {
            download_speed: state.dl_info_speed.max(0) as u64,
            upload_speed: state.up_info_speed.max(0) as u64,
            free_bytes: state.free_space_on_disk.map(|b| b.max(0) as u64),
            connection: parse_connection_status(state.connection_status.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qb_state_downloading() {
        assert_eq!(parse_qb_state("downloading", 10.0), ItemState::Downloading);
        assert_eq!(parse_qb_state("stalledDL", 10.0), ItemState::Downloading);
        assert_eq!(parse_qb_state("metaDL", 0.0), ItemState::Downloading);
    }

    #[test]
    fn test_parse_qb_state_paused_and_queued() {
        assert_eq!(parse_qb_state("pausedDL", 40.0), ItemState::Paused);
        assert_eq!(parse_qb_state("stoppedDL", 40.0), ItemState::Paused);
        assert_eq!(parse_qb_state("queuedDL", 0.0), ItemState::Queued);
    }

    #[test]
    fn test_parse_qb_state_finished() {
        assert_eq!(parse_qb_state("uploading", 100.0), ItemState::Seeding);
        assert_eq!(parse_qb_state("stalledUP", 100.0), ItemState::Seeding);
        assert_eq!(parse_qb_state("pausedUP", 100.0), ItemState::Completed);
        assert_eq!(parse_qb_state("stoppedUP", 100.0), ItemState::Completed);
    }

    #[test]
    fn test_parse_qb_state_error_and_unknown() {
        assert_eq!(parse_qb_state("missingFiles", 50.0), ItemState::Error);
        assert_eq!(parse_qb_state("moving", 100.0), ItemState::Completed);
        assert_eq!(parse_qb_state("moving", 20.0), ItemState::Downloading);
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("auto, movie"), vec!["auto", "movie"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_info_conversion() {
        let json = r#"[{
            "hash": "ABC123",
            "name": "Some.Show.S01",
            "state": "downloading",
            "progress": 0.4,
            "size": 1000000,
            "downloaded": 400000,
            "tags": "auto, tv",
            "added_on": 1703980800
        }]"#;
        let parsed: Vec<QBTorrentInfo> = serde_json::from_str(json).unwrap();
        let info = parsed.into_iter().next().unwrap().into_item_info();

        assert_eq!(info.hash, "abc123");
        assert!((info.progress - 40.0).abs() < 0.001);
        assert_eq!(info.state, ItemState::Downloading);
        assert_eq!(info.native_state, "downloading");
        assert_eq!(info.tags, vec!["auto", "tv"]);
        assert_eq!(info.downloaded_bytes, 400000);
        assert!(info.added_at.is_some());
    }

    #[test]
    fn test_maindata_parsing() {
        let json = r#"{"rid": 1, "server_state": {
            "dl_info_speed": 1024, "up_info_speed": 2048,
            "free_space_on_disk": 751619276800, "connection_status": "connected"
        }}"#;
        let data: QBMainData = serde_json::from_str(json).unwrap();
        let state = data.server_state.unwrap();
        assert_eq!(state.free_space_on_disk, Some(751619276800));
        assert_eq!(
            parse_connection_status(state.connection_status.as_deref()),
            ConnectionState::Connected
        );
    }

    #[test]
    fn test_client_uses_backend_url() {
        let backend = Backend {
            id: "b".to_string(),
            name: "qb".to_string(),
            kind: BackendKind::QBittorrent,
            host: "127.0.0.1".to_string(),
            port: 8080,
            username: Some("admin".to_string()),
            password: Some("pw".to_string()),
            use_tls: false,
            active: true,
            created_at: Utc::now(),
        };
        let client = QBittorrentClient::new(&backend, &DownloaderTimeouts::default()).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
        assert_eq!(client.name(), "qbittorrent");
    }
}
