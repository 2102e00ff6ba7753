//! Relational storage: migration ledger and the SQLite record store.

mod ledger;
mod sqlite;

pub use ledger::{MigrationLedger, applied_migrations, bundled, discover};
pub use sqlite::{SqliteStore, open_database};

use async_trait::async_trait;

use gatehouse_common::{NewContactMessage, RecordId, RecordQuery, StorageError, StoredRecord};

/// Persistence seam used by the admission gateway
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record atomically
    async fn write(&self, record: &NewContactMessage) -> Result<RecordId, StorageError>;

    /// Fetch records matching `query`, oldest first
    async fn read(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, StorageError>;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Generate a random, URL-safe record identifier
pub fn generate_record_id() -> RecordId {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use rand::Rng;

    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    RecordId::new(URL_SAFE_NO_PAD.encode(bytes))
}
