//! Shared constants for Gatehouse components.

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "data/gatehouse.db";

/// Cloudflare Turnstile verification endpoint
pub const DEFAULT_SITEVERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Upper bound on a single siteverify round trip (milliseconds)
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 5_000;

/// Bookkeeping table maintained by the migration ledger
pub const MIGRATIONS_TABLE: &str = "_gatehouse_migrations";

/// Client IP reported to Turnstile when no proxy header is present
pub const FALLBACK_CLIENT_IP: &str = "0.0.0.0";

/// CORS preflight cache lifetime (24 hours)
pub const PREFLIGHT_MAX_AGE_SECS: u64 = 86_400;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Default page size for record reads
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Field limits for contact submissions
pub mod limits {
    pub const MAX_NAME_LEN: usize = 200;
    pub const MAX_EMAIL_LEN: usize = 254;
    pub const MAX_MESSAGE_LEN: usize = 5_000;
    pub const MAX_DATA_ENTRIES: usize = 20;
    pub const MAX_DATA_KEY_LEN: usize = 64;
    pub const MAX_DATA_VALUE_LEN: usize = 1_000;
}

/// HTTP routes
pub mod routes {
    pub const HEALTH_CHECK: &str = "/api/v1/health-check/";
    pub const READY: &str = "/ready";
    pub const CONTACT_US: &str = "/api/v1/contact-us/";
}

/// HTTP header names
pub mod headers {
    /// Client address as seen by the Cloudflare edge
    pub const CF_CONNECTING_IP: &str = "CF-Connecting-IP";

    /// Client address chain from generic reverse proxies
    pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";
}

/// Error codes returned by the Turnstile siteverify API
pub mod turnstile_codes {
    pub const MISSING_INPUT_SECRET: &str = "missing-input-secret";
    pub const INVALID_INPUT_SECRET: &str = "invalid-input-secret";
    pub const MISSING_INPUT_RESPONSE: &str = "missing-input-response";
    pub const INVALID_INPUT_RESPONSE: &str = "invalid-input-response";
    pub const TIMEOUT_OR_DUPLICATE: &str = "timeout-or-duplicate";
    pub const INTERNAL_ERROR: &str = "internal-error";
}
