//! Shared SQLite plumbing for the directory and lifecycle stores.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors returned by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested lifecycle transition is not an edge of the state graph.
    #[error("invalid transition for record {record_id}: {from} -> {to}")]
    InvalidTransition {
        record_id: String,
        from: String,
        to: String,
    },

    /// A content hash was already set to a different value.
    #[error("content hash for record {record_id} is already {existing}")]
    HashConflict { record_id: String, existing: String },

    /// Input rejected before hitting the database.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Database(format!("json: {}", e))
    }
}

/// Open a connection with the pragmas both stores rely on.
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open an in-memory connection (tests).
pub(crate) fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    // WAL lets the directory and lifecycle connections share one file.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Parse an RFC 3339 column, falling back to now for corrupted rows.
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
