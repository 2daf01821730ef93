//! Accounts, rules and download backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cached traffic statistics for a tracker account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    /// Uploaded bytes.
    pub uploaded_bytes: u64,
    /// Downloaded bytes.
    pub downloaded_bytes: u64,
    /// Share ratio as reported by the tracker.
    pub ratio: f64,
    /// Bonus points.
    pub bonus: f64,
}

/// A tracker account the engine acts on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    /// API token used as the tracker credential.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub active: bool,
    pub stats: AccountStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the refresh and acquisition jobs may use this account.
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Request to create an account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Search mode of a rule; also the scope used by auto-delete filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// General listings.
    #[default]
    Normal,
    /// Restricted (adult) listings.
    Adult,
}

impl RuleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::Normal => "normal",
            RuleMode::Adult => "adult",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(RuleMode::Normal),
            "adult" => Some(RuleMode::Adult),
            _ => None,
        }
    }
}

/// An acquisition rule. Immutable for the duration of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub enabled: bool,
    pub mode: RuleMode,
    /// Only accept items in a free promotion class.
    pub free_only: bool,
    /// Only accept items with a double-upload promotion.
    pub double_upload: bool,
    /// Size bounds in GiB, inclusive.
    pub min_size_gb: Option<f64>,
    pub max_size_gb: Option<f64>,
    /// Seeder bounds, inclusive.
    pub min_seeders: Option<u32>,
    pub max_seeders: Option<u32>,
    /// Accepted tracker categories; empty accepts everything.
    pub categories: Vec<String>,
    /// Comma separated keywords; any hit passes.
    pub keywords: Option<String>,
    /// Comma separated keywords; any hit rejects.
    pub exclude_keywords: Option<String>,
    pub backend_id: Option<String>,
    pub save_path: Option<String>,
    pub tags: Vec<String>,
    /// Cap on items the target backend may be downloading at push time.
    pub max_downloading: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Lowercased, trimmed inclusion keywords.
    pub fn include_keywords(&self) -> Vec<String> {
        split_keywords(self.keywords.as_deref())
    }

    /// Lowercased, trimmed exclusion keywords.
    pub fn excluded_keywords(&self) -> Vec<String> {
        split_keywords(self.exclude_keywords.as_deref())
    }
}

fn split_keywords(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Request to create a rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRule {
    pub account_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: RuleMode,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub double_upload: bool,
    #[serde(default)]
    pub min_size_gb: Option<f64>,
    #[serde(default)]
    pub max_size_gb: Option<f64>,
    #[serde(default)]
    pub min_seeders: Option<u32>,
    #[serde(default)]
    pub max_seeders: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub exclude_keywords: Option<String>,
    #[serde(default)]
    pub backend_id: Option<String>,
    #[serde(default)]
    pub save_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_downloading: Option<u32>,
}

impl NewRule {
    /// Treat zero size and seeder bounds as unset.
    pub fn normalized(mut self) -> Self {
        self.min_size_gb = self.min_size_gb.filter(|v| *v > 0.0);
        self.max_size_gb = self.max_size_gb.filter(|v| *v > 0.0);
        self.min_seeders = self.min_seeders.filter(|v| *v > 0);
        self.max_seeders = self.max_seeders.filter(|v| *v > 0);
        self
    }
}

/// Download backend implementation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[serde(alias = "qbittorrent")]
    QBittorrent,
    Transmission,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::QBittorrent => "qbittorrent",
            BackendKind::Transmission => "transmission",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "qbittorrent" | "q_bittorrent" => Some(BackendKind::QBittorrent),
            "transmission" => Some(BackendKind::Transmission),
            _ => None,
        }
    }
}

/// Connection descriptor for a download backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub use_tls: bool,
    /// Liveness flag; inactive backends are never contacted.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Backend {
    /// Base URL without trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        let host = self
            .host
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("{}://{}:{}", scheme, host, self.port)
    }

    /// Stable digest of everything a connection depends on.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.kind.as_str(),
            &self.host,
            &self.port.to_string(),
            self.username.as_deref().unwrap_or(""),
            self.password.as_deref().unwrap_or(""),
            if self.use_tls { "tls" } else { "plain" },
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Request to register a backend.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBackend {
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(host: &str, tls: bool) -> Backend {
        Backend {
            id: "b1".to_string(),
            name: "box".to_string(),
            kind: BackendKind::QBittorrent,
            host: host.to_string(),
            port: 8080,
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            use_tls: tls,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_base_url_scheme() {
        assert_eq!(backend("seedbox.lan", false).base_url(), "http://seedbox.lan:8080");
        assert_eq!(backend("seedbox.lan", true).base_url(), "https://seedbox.lan:8080");
        assert_eq!(
            backend("http://seedbox.lan/", false).base_url(),
            "http://seedbox.lan:8080"
        );
    }

    #[test]
    fn test_fingerprint_tracks_credentials() {
        let a = backend("seedbox.lan", false);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.password = Some("rotated".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_keyword_splitting() {
        let rule = Rule {
            id: "r".to_string(),
            account_id: "a".to_string(),
            name: "n".to_string(),
            enabled: true,
            mode: RuleMode::Normal,
            free_only: false,
            double_upload: false,
            min_size_gb: None,
            max_size_gb: None,
            min_seeders: None,
            max_seeders: None,
            categories: vec![],
            keywords: Some(" Foo, BAR ,,".to_string()),
            exclude_keywords: None,
            backend_id: None,
            save_path: None,
            tags: vec![],
            max_downloading: None,
            created_at: Utc::now(),
        };
        assert_eq!(rule.include_keywords(), vec!["foo", "bar"]);
        assert!(rule.excluded_keywords().is_empty());
    }

    #[test]
    fn test_kind_and_mode_serde() {
        assert_eq!(
            serde_json::to_string(&BackendKind::QBittorrent).unwrap(),
            "\"q_bittorrent\""
        );
        let kind: BackendKind = serde_json::from_str("\"qbittorrent\"").unwrap();
        assert_eq!(kind, BackendKind::QBittorrent);
        assert_eq!(RuleMode::parse("adult"), Some(RuleMode::Adult));
        assert_eq!(RuleMode::Adult.as_str(), "adult");
    }
}
