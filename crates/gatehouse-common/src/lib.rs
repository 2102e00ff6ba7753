//! # Gatehouse Common
//!
//! Shared types, errors, and constants used across Gatehouse components.
//!
//! ## Modules
//! - `types` - Core data structures (ContactCategory, StoredRecord, AdmissionOutcome, etc.)
//! - `error` - Error taxonomy for verification, migrations, and storage
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::{
    MigrationError, StorageError, ValidationError, VerificationError, VerificationErrorKind,
};
pub use types::*;
