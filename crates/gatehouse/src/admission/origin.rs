//! Cross-origin allowlist.

use std::collections::BTreeSet;

/// Immutable set of origins permitted to submit.
///
/// Matching is exact and case-sensitive: no scheme, port, or trailing-slash
/// normalization, and no wildcards.
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    allowed: BTreeSet<String>,
}

impl OriginGuard {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: origins.into_iter().map(Into::into).collect(),
        }
    }

    /// Absent or empty origins are never allowed
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(o) if !o.is_empty() => self.allowed.contains(o),
            _ => false,
        }
    }

    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}
