//! SQLite-backed lifecycle store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{AcquisitionRecord, LifecycleStore, NewRecord, RecordFilter, RecordState};
use crate::promotion::PromotionClass;
use crate::store::{
    open_connection, open_in_memory, parse_optional_timestamp, parse_timestamp, StoreError,
};

const RECORD_COLUMNS: &str = "id, account_id, item_id, name, size_bytes, rule_id, backend_id, \
     info_hash, promotion_class, promotion_ends_at, state, created_at, updated_at";

/// SQLite-backed lifecycle store.
pub struct SqliteLifecycleStore {
    conn: Mutex<Connection>,
}

impl SqliteLifecycleStore {
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
            CREATE TABLE IF NOT EXISTS acquisition_records (
                id TEXT PRIMARY KEY,
                account_id TEXT,
                item_id TEXT NOT NULL,
                name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                rule_id TEXT,
                backend_id TEXT,
                info_hash TEXT,
                promotion_class TEXT,
                promotion_ends_at TEXT,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_state ON acquisition_records(state);
            CREATE INDEX IF NOT EXISTS idx_records_item ON acquisition_records(account_id, item_id);
            CREATE INDEX IF NOT EXISTS idx_records_hash ON acquisition_records(backend_id, info_hash);
            CREATE INDEX IF NOT EXISTS idx_records_created_at ON acquisition_records(created_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &RecordFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.states.is_empty() {
            let placeholders = vec!["?"; filter.states.len()].join(", ");
            conditions.push(format!("state IN ({})", placeholders));
            for state in &filter.states {
                params.push(Box::new(state.as_str().to_string()));
            }
        }

        if let Some(ref backend_id) = filter.backend_id {
            conditions.push("backend_id = ?".to_string());
            params.push(Box::new(backend_id.clone()));
        }

        if let Some(ref account_id) = filter.account_id {
            conditions.push("account_id = ?".to_string());
            params.push(Box::new(account_id.clone()));
        }

        if let Some(ref rule_id) = filter.rule_id {
            conditions.push("rule_id = ?".to_string());
            params.push(Box::new(rule_id.clone()));
        }

        if filter.has_hash {
            conditions.push("info_hash IS NOT NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<AcquisitionRecord> {
        let size: i64 = row.get(4)?;
        let promotion_class: Option<String> = row.get(8)?;
        let state_str: String = row.get(10)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;

        let state = RecordState::parse(&state_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                10,
                rusqlite::types::Type::Text,
                format!("unknown record state: {}", state_str).into(),
            )
        })?;

        Ok(AcquisitionRecord {
            id: row.get(0)?,
            account_id: row.get(1)?,
            item_id: row.get(2)?,
            name: row.get(3)?,
            size_bytes: size.max(0) as u64,
            rule_id: row.get(5)?,
            backend_id: row.get(6)?,
            info_hash: row.get(7)?,
            promotion_class: promotion_class.map(PromotionClass::from),
            promotion_ends_at: parse_optional_timestamp(row.get(9)?),
            state,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<AcquisitionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM acquisition_records WHERE id = ?",
            RECORD_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?)
    }
}

impl LifecycleStore for SqliteLifecycleStore {
    fn create(&self, record: NewRecord) -> Result<AcquisitionRecord, StoreError> {
        if !matches!(
            record.state,
            RecordState::Pending | RecordState::Pushing | RecordState::Failed
        ) {
            return Err(StoreError::InvalidInput(format!(
                "records cannot start in state {}",
                record.state
            )));
        }

        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let info_hash = record.info_hash.map(|h| h.to_lowercase());

        conn.execute(
            &format!(
                "INSERT INTO acquisition_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RECORD_COLUMNS
            ),
            params![
                id,
                record.account_id,
                record.item_id,
                record.name,
                record.size_bytes as i64,
                record.rule_id,
                record.backend_id,
                info_hash,
                record.promotion_class.as_ref().map(|c| c.as_str().to_string()),
                record.promotion_ends_at.map(|t| t.to_rfc3339()),
                record.state.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(AcquisitionRecord {
            id,
            account_id: record.account_id,
            item_id: record.item_id,
            name: record.name,
            size_bytes: record.size_bytes,
            rule_id: record.rule_id,
            backend_id: record.backend_id,
            info_hash,
            promotion_class: record.promotion_class,
            promotion_ends_at: record.promotion_ends_at,
            state: record.state,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<AcquisitionRecord>, StoreError> {
        let conn = self.lock()?;
        Self::fetch(&conn, id)
    }

    fn exists_for_item(&self, account_id: &str, item_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM acquisition_records WHERE account_id = ? AND item_id = ?)",
            params![account_id, item_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_by_hash(
        &self,
        backend_id: &str,
        info_hash: &str,
    ) -> Result<Option<AcquisitionRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM acquisition_records WHERE backend_id = ? AND info_hash = ? \
             ORDER BY created_at DESC LIMIT 1",
            RECORD_COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![backend_id, info_hash.to_lowercase()],
                Self::row_to_record,
            )
            .optional()?)
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<AcquisitionRecord>, StoreError> {
        let conn = self.lock()?;
        let (where_clause, mut params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM acquisition_records {} ORDER BY created_at ASC LIMIT ? OFFSET ?",
            RECORD_COLUMNS, where_clause
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count(&self, filter: &RecordFilter) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM acquisition_records {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn transition(&self, id: &str, to: RecordState) -> Result<AcquisitionRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = Self::fetch(&tx, id)?
            .ok_or_else(|| StoreError::NotFound(format!("record {}", id)))?;

        if current.state == to {
            return Ok(current);
        }
        if !current.state.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                record_id: id.to_string(),
                from: current.state.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE acquisition_records SET state = ?, updated_at = ? WHERE id = ?",
            params![to.as_str(), now.to_rfc3339(), id],
        )?;
        tx.commit()?;

        Ok(AcquisitionRecord {
            state: to,
            updated_at: now,
            ..current
        })
    }

    fn set_hash(&self, id: &str, info_hash: &str) -> Result<AcquisitionRecord, StoreError> {
        let info_hash = info_hash.trim().to_lowercase();
        if info_hash.is_empty() {
            return Err(StoreError::InvalidInput("empty info hash".to_string()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = Self::fetch(&tx, id)?
            .ok_or_else(|| StoreError::NotFound(format!("record {}", id)))?;

        match current.info_hash.as_deref() {
            Some(existing) if existing == info_hash => return Ok(current),
            Some(existing) => {
                return Err(StoreError::HashConflict {
                    record_id: id.to_string(),
                    existing: existing.to_string(),
                })
            }
            None => {}
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE acquisition_records SET info_hash = ?, updated_at = ? WHERE id = ?",
            params![info_hash, now.to_rfc3339(), id],
        )?;
        tx.commit()?;

        Ok(AcquisitionRecord {
            info_hash: Some(info_hash),
            updated_at: now,
            ..current
        })
    }
}
