//! Migration ledger: applies an ordered list of DDL migrations exactly once.
//!
//! The store keeps its own bookkeeping table. The applied set must always be
//! a prefix of the ledger's list; each migration commits together with its
//! bookkeeping row, so a failed migration leaves no trace.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use gatehouse_common::constants::MIGRATIONS_TABLE;
use gatehouse_common::{MigrationError, MigrationStatus};

/// A single sequence-numbered schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub sequence: u32,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(sequence: u32, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            sequence,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// Parse `0001_create_contact_messages.sql` into (1, "create_contact_messages")
    pub fn parse_file_name(file_name: &str) -> Option<(u32, String)> {
        let stem = file_name.strip_suffix(".sql")?;
        let (number, name) = stem.split_once('_')?;
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
            return None;
        }
        Some((number.parse().ok()?, name.to_string()))
    }
}

/// Migrations compiled into the binary
pub fn bundled() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_contact_messages",
            include_str!("../../migrations/0001_create_contact_messages.sql"),
        ),
        Migration::new(
            2,
            "index_contact_messages",
            include_str!("../../migrations/0002_index_contact_messages.sql"),
        ),
    ]
}

/// Read every `NNNN_name.sql` file in `dir`. Other files are ignored.
pub fn discover(dir: &Path) -> Result<Vec<Migration>, MigrationError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| MigrationError::Discovery(format!("{}: {e}", dir.display())))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::Discovery(e.to_string()))?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((sequence, name)) = Migration::parse_file_name(file_name) else {
            tracing::debug!(file = %file_name, "Skipping non-migration file");
            continue;
        };
        let sql = std::fs::read_to_string(&path)
            .map_err(|e| MigrationError::Discovery(format!("{}: {e}", path.display())))?;
        migrations.push(Migration::new(sequence, name, sql));
    }

    migrations.sort_by_key(|m| m.sequence);
    Ok(migrations)
}

/// Row of the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub sequence: u32,
    pub name: String,
    pub applied_at: String,
}

/// Tracks and applies schema migrations against a SQLite store
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    /// Sorted by ascending sequence, no duplicates
    migrations: Vec<Migration>,
}

impl MigrationLedger {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        migrations.sort_by_key(|m| m.sequence);

        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.sequence) {
                return Err(MigrationError::InvalidList(format!(
                    "duplicate sequence number {}",
                    migration.sequence
                )));
            }
            if migration.name.trim().is_empty() {
                return Err(MigrationError::InvalidList(format!(
                    "migration {} has no name",
                    migration.sequence
                )));
            }
        }

        Ok(Self { migrations })
    }

    #[cfg(test)]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Number of migrations known to the ledger
    pub fn defined(&self) -> usize {
        self.migrations.len()
    }

    /// Apply every migration after the highest applied one, in order.
    ///
    /// Returns how many were applied by this call. Safe to re-run after a
    /// failure: application resumes at the first unapplied migration. The
    /// applied set is re-read under the write lock before each migration,
    /// so two processes racing on one file never apply the same one twice.
    pub fn apply_pending(&self, conn: &mut Connection) -> Result<usize, MigrationError> {
        ensure_table(conn)?;

        let mut count = 0;
        while let Some(migration) = self.apply_next(conn)? {
            tracing::info!(
                sequence = migration.sequence,
                name = %migration.name,
                "Applied migration"
            );
            count += 1;
        }

        if count == 0 {
            tracing::debug!(defined = self.defined(), "Schema up to date");
        }

        Ok(count)
    }

    /// Apply the first unapplied migration in its own immediate transaction
    fn apply_next(&self, conn: &mut Connection) -> Result<Option<&Migration>, MigrationError> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| MigrationError::Bookkeeping(format!("failed to lock store: {e}")))?;

        let applied = self.verified_applied(&tx)?;
        let Some(migration) = self.migrations.get(applied.len()) else {
            return Ok(None);
        };

        let failed = |reason: String| MigrationError::Failed {
            sequence: migration.sequence,
            name: migration.name.clone(),
            reason,
        };

        tx.execute_batch(&migration.sql)
            .map_err(|e| failed(e.to_string()))?;
        tx.execute(
            &format!("INSERT INTO {MIGRATIONS_TABLE} (sequence, name, applied_at) VALUES (?1, ?2, ?3)"),
            params![migration.sequence, migration.name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| failed(format!("failed to record migration: {e}")))?;
        tx.commit().map_err(|e| failed(e.to_string()))?;

        Ok(Some(migration))
    }

    /// Report progress without modifying the store
    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus, MigrationError> {
        let applied = if table_exists(conn)? {
            self.verified_applied(conn)?
        } else {
            Vec::new()
        };

        Ok(MigrationStatus {
            defined: self.defined(),
            applied: applied.len(),
            latest: applied.last().map(|m| m.sequence),
        })
    }

    /// Applied rows, checked to be a prefix of the known list
    fn verified_applied(&self, conn: &Connection) -> Result<Vec<AppliedMigration>, MigrationError> {
        let applied = applied_migrations(conn)?;

        if applied.len() > self.migrations.len() {
            return Err(MigrationError::Diverged(format!(
                "store has {} applied migrations but only {} are known",
                applied.len(),
                self.migrations.len()
            )));
        }

        for (row, known) in applied.iter().zip(&self.migrations) {
            if row.sequence != known.sequence {
                return Err(MigrationError::Diverged(format!(
                    "expected migration {} but store recorded {}",
                    known.sequence, row.sequence
                )));
            }
            if row.name != known.name {
                return Err(MigrationError::Diverged(format!(
                    "migration {} is named '{}' in the store but '{}' in the ledger",
                    row.sequence, row.name, known.name
                )));
            }
        }

        Ok(applied)
    }
}

fn ensure_table(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
            sequence INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );"
    ))
    .map_err(|e| MigrationError::Bookkeeping(format!("failed to ensure {MIGRATIONS_TABLE}: {e}")))
}

fn table_exists(conn: &Connection) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![MIGRATIONS_TABLE],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| MigrationError::Bookkeeping(e.to_string()))
}

/// Bookkeeping rows in ascending sequence order
pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>, MigrationError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT sequence, name, applied_at FROM {MIGRATIONS_TABLE} ORDER BY sequence ASC"
        ))
        .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                sequence: row.get(0)?,
                name: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })
        .map_err(|e| MigrationError::Bookkeeping(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| MigrationError::Bookkeeping(e.to_string()))
}
