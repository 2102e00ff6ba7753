//! Application state and startup wiring.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use gatehouse_common::MigrationStatus;

use crate::admission::{AdmissionGateway, OriginGuard, TurnstileVerifier};
use crate::config::AppConfig;
use crate::storage::{self, MigrationLedger, RecordStore, SqliteStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Origin guard + Turnstile verifier + record store
    pub gateway: Arc<AdmissionGateway>,

    /// Schema state captured after startup migrations
    pub migrations: MigrationStatus,
}

impl AppState {
    /// Build the gateway from configuration over an already-migrated store
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        migrations: MigrationStatus,
    ) -> Result<Self> {
        let guard = OriginGuard::new(config.allowed_origins.clone());
        let verifier = Arc::new(TurnstileVerifier::from_config(&config)?);
        let gateway = AdmissionGateway::new(guard, verifier, store);

        Ok(Self::from_parts(config, gateway, migrations))
    }

    pub fn from_parts(
        config: AppConfig,
        gateway: AdmissionGateway,
        migrations: MigrationStatus,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            migrations,
        }
    }
}

/// Bundled migrations, or the configured directory's
pub fn load_ledger(config: &AppConfig) -> Result<MigrationLedger> {
    let migrations = match config.migrations_dir {
        Some(ref dir) => {
            tracing::info!(dir = %dir.display(), "Loading migrations from directory");
            storage::discover(dir)?
        }
        None => storage::bundled(),
    };

    Ok(MigrationLedger::new(migrations)?)
}

/// Open the configured database and apply pending migrations.
///
/// Returns the connection, the ledger, and how many migrations were applied.
pub fn migrate_database(config: &AppConfig) -> Result<(Connection, MigrationLedger, usize)> {
    let ledger = load_ledger(config)?;
    let mut conn = storage::open_database(Path::new(&config.database_path))?;

    let applied = ledger
        .apply_pending(&mut conn)
        .context("Failed to apply migrations")?;

    Ok((conn, ledger, applied))
}

/// Open the configured database without migrating; fails if the schema lags
pub fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    let ledger = load_ledger(config)?;
    let conn = storage::open_database(Path::new(&config.database_path))?;

    Ok(SqliteStore::new(conn, &ledger)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_common::{MigrationError, StorageError};

    fn config_in(dir: &Path) -> AppConfig {
        AppConfig {
            database_path: dir.join("gatehouse.db").display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_migrate_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let (_conn, ledger, applied) = migrate_database(&config).unwrap();
        assert_eq!(applied, ledger.defined());

        let (_conn, _, applied_again) = migrate_database(&config).unwrap();
        assert_eq!(applied_again, 0);

        assert!(open_store(&config).is_ok());
    }

    #[test]
    fn test_open_store_refuses_unmigrated_database() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(&config_in(dir.path())).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::SchemaNotReady { .. })
        ));
    }

    #[test]
    fn test_migrations_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        std::fs::create_dir(&migrations).unwrap();
        std::fs::write(migrations.join("0001_only.sql"), "CREATE TABLE only_one (x);").unwrap();

        let config = AppConfig {
            migrations_dir: Some(migrations),
            ..config_in(dir.path())
        };

        let ledger = load_ledger(&config).unwrap();
        assert_eq!(ledger.defined(), 1);
        assert_eq!(ledger.migrations()[0].name, "only");
    }

    #[test]
    fn test_failed_migration_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        std::fs::create_dir(&migrations).unwrap();
        std::fs::write(migrations.join("0001_bad.sql"), "CREATE TABLE broken (;").unwrap();

        let config = AppConfig {
            migrations_dir: Some(migrations),
            ..config_in(dir.path())
        };

        let err = migrate_database(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::Failed { sequence: 1, .. })
        ));

        // Nothing was recorded, so no store can be opened over it
        let err = open_store(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::SchemaNotReady { defined: 1, applied: 0 })
        ));
    }

    #[test]
    fn test_state_from_config() {
        let config = AppConfig {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            ..Default::default()
        };
        let store: Arc<dyn RecordStore> = crate::admission::test_support::migrated_store();
        let status = MigrationStatus {
            defined: 2,
            applied: 2,
            latest: Some(2),
        };

        let state = AppState::new(config, store, status).unwrap();
        assert!(state.gateway.guard().is_allowed(Some("http://localhost:5173")));
        assert!(state.migrations.is_current());
    }
}
