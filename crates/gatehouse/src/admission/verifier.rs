//! Turnstile siteverify client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use gatehouse_common::constants::turnstile_codes;
use gatehouse_common::{VerificationError, VerificationResult};

use crate::config::{AppConfig, SecretString};

/// Verification seam used by the admission gateway
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Check a client token. Never retries; failures come back as
    /// `success: false` with a classified error.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> VerificationResult;
}

#[derive(Serialize)]
struct SiteverifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
    #[serde(default)]
    hostname: Option<String>,
}

/// Cloudflare Turnstile verifier
pub struct TurnstileVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: SecretString,
    timeout: Duration,
}

impl TurnstileVerifier {
    pub fn new(endpoint: impl Into<String>, secret: SecretString, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            secret,
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.turnstile_siteverify_url.clone(),
            config.turnstile_secret_key.clone(),
            config.verify_timeout(),
        )
    }

    fn network_error(&self, err: reqwest::Error) -> VerificationError {
        if err.is_timeout() {
            VerificationError::network(format!(
                "siteverify timed out after {} ms",
                self.timeout.as_millis()
            ))
        } else {
            VerificationError::network(format!("siteverify request failed: {}", err.without_url()))
        }
    }
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> VerificationResult {
        let fingerprint = token_fingerprint(token);
        let body = SiteverifyRequest {
            secret: self.secret.expose(),
            response: token,
            remoteip: remote_ip,
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = self.network_error(e);
                tracing::warn!(token = %fingerprint, error = %err, "Turnstile request failed");
                return VerificationResult::failed(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(token = %fingerprint, status = %status, "Turnstile returned error status");
            return VerificationResult::failed(VerificationError::network(format!(
                "siteverify returned HTTP {status}"
            )));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = self.network_error(e);
                tracing::warn!(token = %fingerprint, error = %err, "Failed to read Turnstile response");
                return VerificationResult::failed(err);
            }
        };

        let parsed: SiteverifyResponse = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(token = %fingerprint, error = %e, "Failed to parse Turnstile response");
                return VerificationResult::failed(VerificationError::malformed(format!(
                    "unparseable siteverify body: {e}"
                )));
            }
        };

        if parsed.success {
            tracing::debug!(
                token = %fingerprint,
                hostname = ?parsed.hostname,
                "Turnstile token verified"
            );
            return VerificationResult::passed();
        }

        for code in &parsed.error_codes {
            match code.as_str() {
                turnstile_codes::MISSING_INPUT_SECRET | turnstile_codes::INVALID_INPUT_SECRET => {
                    tracing::error!(code = %code, "Turnstile secret key is misconfigured");
                }
                turnstile_codes::INVALID_INPUT_RESPONSE => {
                    tracing::info!(token = %fingerprint, "Invalid or expired token");
                }
                turnstile_codes::TIMEOUT_OR_DUPLICATE => {
                    tracing::info!(token = %fingerprint, "Token timeout or duplicate submission");
                }
                _ => {
                    tracing::info!(token = %fingerprint, code = %code, "Turnstile validation failed");
                }
            }
        }

        VerificationResult::failed(VerificationError::rejected(parsed.error_codes))
    }
}

/// Short SHA-256 prefix of a token, safe to log
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}
