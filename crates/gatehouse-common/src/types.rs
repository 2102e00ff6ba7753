//! Core types shared across Gatehouse components.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LIST_LIMIT, limits};
use crate::error::{ValidationError, VerificationError};

/// Contact submission category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactCategory {
    /// Bug or problem report
    Error,
    /// Feature request or suggestion
    Idea,
    /// Public feedback
    Testimonial,
    Other,
}

impl ContactCategory {
    pub const ALL: [ContactCategory; 4] = [
        ContactCategory::Error,
        ContactCategory::Idea,
        ContactCategory::Testimonial,
        ContactCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Idea => "IDEA",
            Self::Testimonial => "TESTIMONIAL",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for ContactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parse
impl FromStr for ContactCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidCategory(s.to_string()))
    }
}

/// A validated contact submission awaiting persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContactMessage {
    pub category: ContactCategory,
    pub email: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

impl NewContactMessage {
    /// Parse and validate raw submission fields
    pub fn create(
        category: &str,
        email: String,
        name: String,
        message: String,
        data: Option<BTreeMap<String, String>>,
    ) -> Result<Self, ValidationError> {
        let category = category.parse::<ContactCategory>()?;
        let email = email.trim().to_string();
        let name = name.trim().to_string();

        validate_email(&email)?;
        validate_text("name", &name, limits::MAX_NAME_LEN)?;
        validate_text("message", &message, limits::MAX_MESSAGE_LEN)?;
        if let Some(ref map) = data {
            validate_data(map)?;
        }

        Ok(Self {
            category,
            email,
            name,
            message,
            data,
        })
    }
}

fn validate_text(field: &'static str, value: &str, max_len: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::field(field, "must not be empty"));
    }
    if value.chars().count() > max_len {
        return Err(ValidationError::field(
            field,
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    validate_text("email", email, limits::MAX_EMAIL_LEN)?;

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::field("email", "is not a valid address"))
    }
}

fn validate_data(data: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if data.len() > limits::MAX_DATA_ENTRIES {
        return Err(ValidationError::field(
            "data",
            format!("must have at most {} entries", limits::MAX_DATA_ENTRIES),
        ));
    }
    for (key, value) in data {
        if key.is_empty() || key.chars().count() > limits::MAX_DATA_KEY_LEN {
            return Err(ValidationError::field(
                "data",
                format!("keys must be 1-{} characters", limits::MAX_DATA_KEY_LEN),
            ));
        }
        if value.chars().count() > limits::MAX_DATA_VALUE_LEN {
            return Err(ValidationError::field(
                "data",
                format!(
                    "values must be at most {} characters",
                    limits::MAX_DATA_VALUE_LEN
                ),
            ));
        }
    }
    Ok(())
}

/// Identifier of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the `contact_messages` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub category: ContactCategory,
    pub email: String,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
    /// Unix epoch seconds
    pub created_at: i64,
}

/// Filter for record reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub category: Option<ContactCategory>,
    /// Only records created at or after this timestamp
    pub since: Option<i64>,
    pub limit: usize,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            category: None,
            since: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

/// Outcome of a single CAPTCHA verification call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    /// Codes reported by the remote service
    pub error_codes: Vec<String>,
    /// Set whenever `success` is false
    pub error: Option<VerificationError>,
}

impl VerificationResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            error_codes: Vec::new(),
            error: None,
        }
    }

    pub fn failed(error: VerificationError) -> Self {
        Self {
            success: false,
            error_codes: error.error_codes.clone(),
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<(), VerificationError> {
        if self.success {
            return Ok(());
        }
        Err(self
            .error
            .unwrap_or_else(|| VerificationError::rejected(self.error_codes)))
    }
}

/// Terminal denial of a request by the admission gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Origin header absent or not in the allowlist
    Origin { origin: Option<String> },
    /// CAPTCHA token did not verify
    Captcha(VerificationError),
}

impl Rejection {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Origin { .. } => "origin",
            Self::Captcha(_) => "captcha",
        }
    }

    /// Returns the HTTP status code for this rejection
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Origin { .. } => 403,
            Self::Captcha(err) => err.status_code(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Origin { origin: Some(o) } => write!(f, "origin '{o}' is not allowed"),
            Self::Origin { origin: None } => f.write_str("origin header missing"),
            Self::Captcha(err) => write!(f, "{err}"),
        }
    }
}

/// Result of running a request through the admission gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted { record_id: RecordId },
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Snapshot of how far a store has been migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Migrations known to the ledger
    pub defined: usize,
    /// Migrations recorded as applied in the store
    pub applied: usize,
    /// Highest applied sequence number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<u32>,
}

impl MigrationStatus {
    pub fn pending(&self) -> usize {
        self.defined.saturating_sub(self.applied)
    }

    pub fn is_current(&self) -> bool {
        self.pending() == 0
    }
}
