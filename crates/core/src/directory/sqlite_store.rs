//! SQLite-backed directory store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Account, AccountStats, Backend, BackendKind, DirectoryStore, NewAccount, NewBackend, NewRule,
    Rule, RuleMode,
};
use crate::store::{
    open_connection, open_in_memory, parse_optional_timestamp, parse_timestamp, StoreError,
};

const ACCOUNT_COLUMNS: &str = "id, username, api_key, active, uploaded_bytes, downloaded_bytes, \
     ratio, bonus, stats_refreshed_at, created_at";

const RULE_COLUMNS: &str = "id, account_id, name, enabled, mode, free_only, double_upload, \
     min_size_gb, max_size_gb, min_seeders, max_seeders, categories, keywords, exclude_keywords, \
     backend_id, save_path, tags, max_downloading, created_at";

const BACKEND_COLUMNS: &str =
    "id, name, kind, host, port, username, password, use_tls, active, created_at";

/// SQLite-backed directory store.
pub struct SqliteDirectoryStore {
    conn: Mutex<Connection>,
}

impl SqliteDirectoryStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = open_connection(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                api_key TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                uploaded_bytes INTEGER NOT NULL DEFAULT 0,
                downloaded_bytes INTEGER NOT NULL DEFAULT 0,
                ratio REAL NOT NULL DEFAULT 0,
                bonus REAL NOT NULL DEFAULT 0,
                stats_refreshed_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES accounts(id),
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                mode TEXT NOT NULL DEFAULT 'normal',
                free_only INTEGER NOT NULL DEFAULT 0,
                double_upload INTEGER NOT NULL DEFAULT 0,
                min_size_gb REAL,
                max_size_gb REAL,
                min_seeders INTEGER,
                max_seeders INTEGER,
                categories TEXT NOT NULL DEFAULT '[]',
                keywords TEXT,
                exclude_keywords TEXT,
                backend_id TEXT,
                save_path TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                max_downloading INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backends (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                username TEXT,
                password TEXT,
                use_tls INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_rules_account ON rules(account_id);
            CREATE INDEX IF NOT EXISTS idx_rules_enabled ON rules(enabled);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let created_at: String = row.get(9)?;
        Ok(Account {
            id: row.get(0)?,
            username: row.get(1)?,
            api_key: row.get(2)?,
            active: row.get(3)?,
            stats: AccountStats {
                uploaded_bytes: row.get::<_, i64>(4)?.max(0) as u64,
                downloaded_bytes: row.get::<_, i64>(5)?.max(0) as u64,
                ratio: row.get(6)?,
                bonus: row.get(7)?,
            },
            stats_refreshed_at: parse_optional_timestamp(row.get(8)?),
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<Rule> {
        let mode: String = row.get(4)?;
        let categories: String = row.get(11)?;
        let tags: String = row.get(16)?;
        let created_at: String = row.get(18)?;

        Ok(Rule {
            id: row.get(0)?,
            account_id: row.get(1)?,
            name: row.get(2)?,
            enabled: row.get(3)?,
            mode: RuleMode::parse(&mode).unwrap_or_default(),
            free_only: row.get(5)?,
            double_upload: row.get(6)?,
            min_size_gb: row.get(7)?,
            max_size_gb: row.get(8)?,
            min_seeders: row.get(9)?,
            max_seeders: row.get(10)?,
            categories: serde_json::from_str(&categories).unwrap_or_default(),
            keywords: row.get(12)?,
            exclude_keywords: row.get(13)?,
            backend_id: row.get(14)?,
            save_path: row.get(15)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            max_downloading: row.get(17)?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_backend(row: &rusqlite::Row) -> rusqlite::Result<Backend> {
        let kind: String = row.get(2)?;
        let created_at: String = row.get(9)?;
        let kind = BackendKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown backend kind: {}", kind).into(),
            )
        })?;

        Ok(Backend {
            id: row.get(0)?,
            name: row.get(1)?,
            kind,
            host: row.get(3)?,
            port: row.get(4)?,
            username: row.get(5)?,
            password: row.get(6)?,
            use_tls: row.get(7)?,
            active: row.get(8)?,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn validate_rule(request: &NewRule) -> Result<(), StoreError> {
        if request.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("rule name is empty".to_string()));
        }
        if let (Some(min), Some(max)) = (request.min_size_gb, request.max_size_gb) {
            if min > max {
                return Err(StoreError::InvalidInput(format!(
                    "min_size_gb {} exceeds max_size_gb {}",
                    min, max
                )));
            }
        }
        if let (Some(min), Some(max)) = (request.min_seeders, request.max_seeders) {
            if min > max {
                return Err(StoreError::InvalidInput(format!(
                    "min_seeders {} exceeds max_seeders {}",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

impl DirectoryStore for SqliteDirectoryStore {
    fn create_account(&self, request: NewAccount) -> Result<Account, StoreError> {
        if request.username.trim().is_empty() {
            return Err(StoreError::InvalidInput("username is empty".to_string()));
        }
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO accounts (id, username, api_key, active, created_at) VALUES (?, ?, ?, ?, ?)",
            params![id, request.username, request.api_key, request.active, now.to_rfc3339()],
        )?;

        Ok(Account {
            id,
            username: request.username,
            api_key: request.api_key,
            active: request.active,
            stats: AccountStats::default(),
            stats_refreshed_at: None,
            created_at: now,
        })
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_account)
            .optional()?)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM accounts ORDER BY created_at ASC",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let accounts = stmt
            .query_map([], Self::row_to_account)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn update_account_stats(&self, id: &str, stats: &AccountStats) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE accounts SET uploaded_bytes = ?, downloaded_bytes = ?, ratio = ?, bonus = ?, \
             stats_refreshed_at = ? WHERE id = ?",
            params![
                stats.uploaded_bytes as i64,
                stats.downloaded_bytes as i64,
                stats.ratio,
                stats.bonus,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("account {}", id)));
        }
        Ok(())
    }

    fn create_rule(&self, request: NewRule) -> Result<Rule, StoreError> {
        let request = request.normalized();
        Self::validate_rule(&request)?;
        let conn = self.lock()?;

        let account_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)",
            params![request.account_id],
            |row| row.get(0),
        )?;
        if !account_exists {
            return Err(StoreError::NotFound(format!(
                "account {}",
                request.account_id
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let categories = serde_json::to_string(&request.categories)?;
        let tags = serde_json::to_string(&request.tags)?;

        conn.execute(
            &format!(
                "INSERT INTO rules ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RULE_COLUMNS
            ),
            params![
                id,
                request.account_id,
                request.name,
                request.enabled,
                request.mode.as_str(),
                request.free_only,
                request.double_upload,
                request.min_size_gb,
                request.max_size_gb,
                request.min_seeders,
                request.max_seeders,
                categories,
                request.keywords,
                request.exclude_keywords,
                request.backend_id,
                request.save_path,
                tags,
                request.max_downloading,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Rule {
            id,
            account_id: request.account_id,
            name: request.name,
            enabled: request.enabled,
            mode: request.mode,
            free_only: request.free_only,
            double_upload: request.double_upload,
            min_size_gb: request.min_size_gb,
            max_size_gb: request.max_size_gb,
            min_seeders: request.min_seeders,
            max_seeders: request.max_seeders,
            categories: request.categories,
            keywords: request.keywords,
            exclude_keywords: request.exclude_keywords,
            backend_id: request.backend_id,
            save_path: request.save_path,
            tags: request.tags,
            max_downloading: request.max_downloading,
            created_at: now,
        })
    }

    fn get_rule(&self, id: &str) -> Result<Option<Rule>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM rules WHERE id = ?", RULE_COLUMNS);
        Ok(conn.query_row(&sql, params![id], Self::row_to_rule).optional()?)
    }

    fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM rules ORDER BY created_at ASC", RULE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rules = stmt
            .query_map([], Self::row_to_rule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    fn list_enabled_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM rules WHERE enabled = 1 ORDER BY created_at ASC",
            RULE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rules = stmt
            .query_map([], Self::row_to_rule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    fn create_backend(&self, request: NewBackend) -> Result<Backend, StoreError> {
        if request.host.trim().is_empty() {
            return Err(StoreError::InvalidInput("backend host is empty".to_string()));
        }
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            &format!(
                "INSERT INTO backends ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                BACKEND_COLUMNS
            ),
            params![
                id,
                request.name,
                request.kind.as_str(),
                request.host,
                request.port,
                request.username,
                request.password,
                request.use_tls,
                request.active,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Backend {
            id,
            name: request.name,
            kind: request.kind,
            host: request.host,
            port: request.port,
            username: request.username,
            password: request.password,
            use_tls: request.use_tls,
            active: request.active,
            created_at: now,
        })
    }

    fn get_backend(&self, id: &str) -> Result<Option<Backend>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM backends WHERE id = ?", BACKEND_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_backend)
            .optional()?)
    }

    fn list_backends(&self) -> Result<Vec<Backend>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM backends ORDER BY created_at ASC",
            BACKEND_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let backends = stmt
            .query_map([], Self::row_to_backend)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(backends)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
