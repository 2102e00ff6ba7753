//! Configuration management for Gatehouse.
//!
//! Values are read once at startup: an optional TOML file, then process
//! environment variables (`ALLOWED_ORIGINS`, `TURNSTILE_SECRET_KEY`, ...),
//! then CLI overrides. The resulting [`AppConfig`] is passed explicitly to
//! each component; nothing reads the environment after this point.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gatehouse_common::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_LISTEN_ADDR, DEFAULT_SITEVERIFY_URL, DEFAULT_VERIFY_TIMEOUT_MS,
};

/// Deployment mode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

/// A credential that never appears in `Debug` output or logs
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    #[cfg(test)]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Deployment mode (`ENVIRONMENT`)
    #[serde(default)]
    pub environment: Environment,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Exact origin strings permitted to submit (`ALLOWED_ORIGINS`)
    #[serde(default, deserialize_with = "deserialize_origins")]
    pub allowed_origins: Vec<String>,

    /// Turnstile siteverify endpoint (`TURNSTILE_SITEVERIFY_URL`)
    #[serde(default = "default_siteverify_url")]
    pub turnstile_siteverify_url: String,

    /// Turnstile secret (`TURNSTILE_SECRET_KEY`)
    #[serde(default)]
    pub turnstile_secret_key: SecretString,

    /// Upper bound on a siteverify round trip
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,

    /// Directory of `NNNN_name.sql` files replacing the bundled migrations
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_database_path() -> String { DEFAULT_DATABASE_PATH.to_string() }
fn default_siteverify_url() -> String { DEFAULT_SITEVERIFY_URL.to_string() }
fn default_verify_timeout_ms() -> u64 { DEFAULT_VERIFY_TIMEOUT_MS }

/// Accepts either `"a, b"` or `["a", "b"]`
fn deserialize_origins<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OriginList {
        Csv(String),
        List(Vec<String>),
    }

    let raw = match OriginList::deserialize(deserializer)? {
        OriginList::Csv(csv) => csv.split(',').map(str::to_string).collect::<Vec<_>>(),
        OriginList::List(list) => list,
    };

    Ok(raw
        .into_iter()
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect())
}

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using environment only");
        }

        let settings = builder
            .add_source(config::Environment::default())
            .build()
            .context("Failed to load configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        // Apply CLI overrides
        if let Some(ref database) = args.database {
            config.database_path = database.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }

        Ok(config)
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.turnstile_secret_key.is_empty() {
            bail!("Missing TURNSTILE_SECRET_KEY");
        }

        let url = reqwest::Url::parse(&self.turnstile_siteverify_url)
            .context("TURNSTILE_SITEVERIFY_URL is not a valid URL")?;

        if self.verify_timeout_ms == 0 {
            bail!("verify_timeout_ms must be greater than zero");
        }

        if self.allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_ORIGINS is empty, every submission will be rejected");
        }

        if self.environment == Environment::Production && url.scheme() != "https" {
            tracing::warn!(
                scheme = url.scheme(),
                "Siteverify endpoint is not HTTPS in production"
            );
        }

        Ok(())
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            allowed_origins: Vec::new(),
            turnstile_siteverify_url: default_siteverify_url(),
            turnstile_secret_key: SecretString::default(),
            verify_timeout_ms: default_verify_timeout_ms(),
            migrations_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_sources(toml: &str, env: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .add_source(config::Environment::default().source(Some(env)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_environment_bindings() {
        let config = from_sources(
            "",
            &[
                ("ENVIRONMENT", "test"),
                ("TURNSTILE_SITEVERIFY_URL", "https://test.com/turnstile/v0/siteverify"),
                ("TURNSTILE_SECRET_KEY", "test-secret-key"),
                ("ALLOWED_ORIGINS", "http://localhost:5173"),
            ],
        );

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(
            config.turnstile_siteverify_url,
            "https://test.com/turnstile/v0/siteverify"
        );
        assert_eq!(config.turnstile_secret_key.expose(), "test-secret-key");
        assert_eq!(config.allowed_origins, vec!["http://localhost:5173"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_origins_comma_separated() {
        let config = from_sources(
            "",
            &[("ALLOWED_ORIGINS", "http://localhost:5173, https://example.com,,")],
        );
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:5173", "https://example.com"]
        );
    }

    #[test]
    fn test_origins_list_form() {
        let config = from_sources(
            r#"allowed_origins = ["https://a.example", "https://b.example"]"#,
            &[],
        );
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_defaults() {
        let config = from_sources("", &[]);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.turnstile_siteverify_url, DEFAULT_SITEVERIFY_URL);
        assert_eq!(config.verify_timeout(), Duration::from_millis(DEFAULT_VERIFY_TIMEOUT_MS));
        assert!(config.allowed_origins.is_empty());
        assert!(config.migrations_dir.is_none());
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TURNSTILE_SECRET_KEY"));
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = AppConfig {
            turnstile_secret_key: SecretString::new("super-secret"),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
