//! SQLite-backed record store.
//!
//! The connection lives behind a mutex that is only ever locked inside a
//! `spawn_blocking` closure, so no request holds it across an `.await`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};

use gatehouse_common::{
    ContactCategory, NewContactMessage, RecordId, RecordQuery, StorageError, StoredRecord,
};

use super::{MigrationLedger, RecordStore, generate_record_id};

/// Open (creating if needed) a SQLite database with WAL and a busy timeout
pub fn open_database(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Unavailable(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let conn = Connection::open(path).map_err(|e| {
        StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
    })?;

    conn.execute_batch(
        "PRAGMA busy_timeout = 5000;
         PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| StorageError::Database(format!("failed to configure pragmas: {e}")))?;

    Ok(conn)
}

/// Record store over a migrated SQLite connection
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap a connection, refusing one whose schema lags the ledger
    pub fn new(conn: Connection, ledger: &MigrationLedger) -> Result<Self, StorageError> {
        let status = ledger
            .status(&conn)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if status.defined > 0 && !status.is_current() {
            return Err(StorageError::SchemaNotReady {
                defined: status.defined,
                applied: status.applied,
            });
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage worker failed: {e}")))?
    }
}

/// Row as read from SQLite, before decoding
struct RawRow {
    id: String,
    category: String,
    email: String,
    name: String,
    message: String,
    data: Option<String>,
    created_at: i64,
}

impl RawRow {
    fn decode(self) -> Result<StoredRecord, StorageError> {
        let category = self
            .category
            .parse::<ContactCategory>()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let data = self
            .data
            .map(|json| serde_json::from_str::<BTreeMap<String, String>>(&json))
            .transpose()
            .map_err(|e| StorageError::Serialization(format!("bad data column: {e}")))?;

        Ok(StoredRecord {
            id: RecordId::new(self.id),
            category,
            email: self.email,
            name: self.name,
            message: self.message,
            data,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn write(&self, record: &NewContactMessage) -> Result<RecordId, StorageError> {
        let data_json = record
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(format!("JSON serialization failed: {e}")))?;

        let id = generate_record_id();
        let record = record.clone();
        let created_at = Utc::now().timestamp();

        let row_id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StorageError::Database(format!("failed to start transaction: {e}")))?;

            tx.execute(
                "INSERT INTO contact_messages (id, category, email, name, message, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row_id.as_str(),
                    record.category.as_str(),
                    record.email,
                    record.name,
                    record.message,
                    data_json,
                    created_at,
                ],
            )
            .map_err(|e| StorageError::Database(format!("failed to execute insert: {e}")))?;

            tx.commit()
                .map_err(|e| StorageError::Database(format!("failed to commit: {e}")))
        })
        .await?;

        tracing::debug!(record_id = %id, "Stored contact message");
        Ok(id)
    }

    async fn read(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, StorageError> {
        let category = query.category.map(|c| c.as_str());
        let since = query.since;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, category, email, name, message, data, created_at
                         FROM contact_messages
                         WHERE (?1 IS NULL OR category = ?1)
                           AND (?2 IS NULL OR created_at >= ?2)
                         ORDER BY created_at ASC, rowid ASC
                         LIMIT ?3",
                    )
                    .map_err(|e| StorageError::Database(e.to_string()))?;

                let rows = stmt
                    .query_map(params![category, since, limit], |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            category: row.get(1)?,
                            email: row.get(2)?,
                            name: row.get(3)?,
                            message: row.get(4)?,
                            data: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    })
                    .map_err(|e| StorageError::Database(e.to_string()))?;

                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| StorageError::Database(e.to_string()))
            })
            .await?;

        rows.into_iter().map(RawRow::decode).collect()
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StorageError::Database(e.to_string()))
        })
        .await
    }
}
