//! Error taxonomy shared across Gatehouse components.
//!
//! None of these types ever carry the Turnstile secret or a raw client token.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::turnstile_codes;

/// Invalid contact submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Category is not one of the known values
    #[error("Category '{0}' is invalid")]
    InvalidCategory(String),

    /// A field failed a content or length check
    #[error("Field '{field}' {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Why a CAPTCHA verification did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationErrorKind {
    /// Transport failure, timeout, or non-success HTTP status
    Network,
    /// Remote answered with a body we could not interpret
    MalformedResponse,
    /// Remote answered `success: false`
    RejectedByRemote,
}

impl VerificationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::MalformedResponse => "malformed-response",
            Self::RejectedByRemote => "rejected-by-remote",
        }
    }
}

impl std::fmt::Display for VerificationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CAPTCHA verification failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("CAPTCHA verification failed ({kind}): {detail}")]
pub struct VerificationError {
    pub kind: VerificationErrorKind,
    /// Error codes reported by the remote service, if any
    pub error_codes: Vec<String>,
    /// Human-readable detail (never includes token or secret)
    pub detail: String,
}

impl VerificationError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: VerificationErrorKind::Network,
            error_codes: Vec::new(),
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: VerificationErrorKind::MalformedResponse,
            error_codes: Vec::new(),
            detail: detail.into(),
        }
    }

    pub fn rejected(error_codes: Vec<String>) -> Self {
        let detail = if error_codes.is_empty() {
            "remote reported failure".to_string()
        } else {
            error_codes.join(", ")
        };
        Self {
            kind: VerificationErrorKind::RejectedByRemote,
            error_codes,
            detail,
        }
    }

    /// True when the remote blamed our secret rather than the client token
    pub fn is_misconfiguration(&self) -> bool {
        self.error_codes.iter().any(|code| {
            code == turnstile_codes::MISSING_INPUT_SECRET
                || code == turnstile_codes::INVALID_INPUT_SECRET
        })
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        if self.is_misconfiguration() { 500 } else { 401 }
    }
}

/// Schema migration failure. Fatal to startup.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The supplied migration list is not usable (duplicates, bad names)
    #[error("Invalid migration list: {0}")]
    InvalidList(String),

    /// Migration files could not be discovered or read
    #[error("Failed to load migrations: {0}")]
    Discovery(String),

    /// The store's applied set is not a prefix of the known list
    #[error("Store migrations diverge from the known list: {0}")]
    Diverged(String),

    /// The ledger's own bookkeeping failed
    #[error("Migration bookkeeping error: {0}")]
    Bookkeeping(String),

    /// A migration's DDL failed; earlier migrations remain applied
    #[error("Migration {sequence:04} ({name}) failed: {reason}")]
    Failed {
        sequence: u32,
        name: String,
        reason: String,
    },
}

/// Persistence failure, reported separately from admission denial
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store has not been migrated to the ledger's current schema
    #[error("Schema not ready: {applied} of {defined} migrations applied")]
    SchemaNotReady { defined: usize, applied: usize },

    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// Row payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Connection unusable (poisoned lock, worker panicked)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SchemaNotReady { .. } | Self::Unavailable(_) => 503,
            Self::Database(_) | Self::Serialization(_) => 500,
        }
    }

    /// Returns true if the caller may reasonably retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}
