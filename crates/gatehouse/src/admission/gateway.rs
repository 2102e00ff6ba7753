//! Admission gateway: origin gate, then CAPTCHA gate, then storage.
//!
//! ```text
//! Start → OriginChecked → Verified → Admitted
//!   └──────────┴─────────────┴──→ Rejected
//! ```
//!
//! Passing the origin gate yields an [`OriginChecked`] value; `admit` only
//! accepts one, so verification cannot run for a request that skipped or
//! failed the origin check.

use std::sync::Arc;

use gatehouse_common::{AdmissionOutcome, NewContactMessage, Rejection, StorageError};

use super::{CaptchaVerifier, OriginGuard, token_fingerprint};
use crate::storage::RecordStore;

/// Proof that a request's origin is on the allowlist
#[derive(Debug)]
pub struct OriginChecked {
    origin: String,
}

/// Everything the gateway needs to decide on one request
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub origin: Option<String>,
    pub token: String,
    pub remote_ip: Option<String>,
    pub record: NewContactMessage,
}

/// Composes the origin guard, the CAPTCHA verifier, and the record store
pub struct AdmissionGateway {
    guard: OriginGuard,
    verifier: Arc<dyn CaptchaVerifier>,
    store: Arc<dyn RecordStore>,
}

impl AdmissionGateway {
    pub fn new(
        guard: OriginGuard,
        verifier: Arc<dyn CaptchaVerifier>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            guard,
            verifier,
            store,
        }
    }

    pub fn guard(&self) -> &OriginGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Start → OriginChecked, or Rejected(origin)
    pub fn check_origin(&self, origin: Option<&str>) -> Result<OriginChecked, Rejection> {
        match origin {
            Some(o) if self.guard.is_allowed(Some(o)) => Ok(OriginChecked {
                origin: o.to_string(),
            }),
            _ => {
                tracing::warn!(origin = ?origin, "Blocked unauthorised origin");
                Err(Rejection::Origin {
                    origin: origin.map(str::to_string),
                })
            }
        }
    }

    /// OriginChecked → Verified → Admitted, or Rejected(captcha).
    ///
    /// Storage failures after verification are returned as `Err`, never as
    /// a rejection. Nothing here is retried.
    pub async fn admit(
        &self,
        checked: OriginChecked,
        token: &str,
        remote_ip: Option<&str>,
        record: &NewContactMessage,
    ) -> Result<AdmissionOutcome, StorageError> {
        let verification = self.verifier.verify(token, remote_ip).await;

        if let Err(err) = verification.into_result() {
            tracing::info!(
                origin = %checked.origin,
                token = %token_fingerprint(token),
                kind = %err.kind,
                "Request rejected: CAPTCHA verification failed"
            );
            return Ok(AdmissionOutcome::Rejected(Rejection::Captcha(err)));
        }

        let record_id = self.store.write(record).await.inspect_err(|e| {
            tracing::error!(origin = %checked.origin, error = %e, "Failed to store admitted request");
        })?;

        tracing::info!(
            origin = %checked.origin,
            record_id = %record_id,
            category = %record.category,
            "Request admitted"
        );

        Ok(AdmissionOutcome::Admitted { record_id })
    }

    /// Run a request through every gate
    pub async fn admit_request(
        &self,
        request: AdmissionRequest,
    ) -> Result<AdmissionOutcome, StorageError> {
        let checked = match self.check_origin(request.origin.as_deref()) {
            Ok(checked) => checked,
            Err(rejection) => return Ok(AdmissionOutcome::Rejected(rejection)),
        };

        self.admit(
            checked,
            &request.token,
            request.remote_ip.as_deref(),
            &request.record,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::TurnstileVerifier;
    use crate::admission::test_support::{
        ALLOWED_ORIGIN, BrokenStore, MockSiteverify, StubVerifier, TEST_SECRET, migrated_store,
        sample_message,
    };
    use crate::config::SecretString;
    use gatehouse_common::{RecordQuery, VerificationError, VerificationErrorKind};
    use std::time::Duration;

    fn request(origin: Option<&str>, token: &str) -> AdmissionRequest {
        AdmissionRequest {
            origin: origin.map(str::to_string),
            token: token.to_string(),
            remote_ip: Some("203.0.113.7".to_string()),
            record: sample_message(),
        }
    }

    fn turnstile(endpoint: String, timeout: Duration) -> Arc<TurnstileVerifier> {
        Arc::new(TurnstileVerifier::new(endpoint, SecretString::new(TEST_SECRET), timeout).unwrap())
    }

    async fn stored_count(gateway: &AdmissionGateway) -> usize {
        gateway.store().read(&RecordQuery::default()).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_disallowed_origin_never_calls_verifier() {
        let verifier = StubVerifier::passing();
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            verifier.clone(),
            migrated_store(),
        );

        for origin in [Some("http://evil.example"), Some(""), None] {
            let outcome = gateway.admit_request(request(origin, "valid-token")).await.unwrap();
            assert!(matches!(
                outcome,
                AdmissionOutcome::Rejected(Rejection::Origin { .. })
            ));
        }

        assert_eq!(verifier.calls(), 0);
        assert_eq!(stored_count(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_verified_request_is_written_once() {
        let verifier = StubVerifier::passing();
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            verifier.clone(),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some(ALLOWED_ORIGIN), "valid-token"))
            .await
            .unwrap();

        let AdmissionOutcome::Admitted { record_id } = outcome else {
            panic!("expected admission, got {outcome:?}");
        };
        assert_eq!(verifier.calls(), 1);

        let rows = gateway.store().read(&RecordQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, record_id);
    }

    #[tokio::test]
    async fn test_failed_verification_writes_nothing() {
        let verifier = StubVerifier::failing(VerificationError::rejected(vec![
            "invalid-input-response".to_string(),
        ]));
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            verifier.clone(),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some(ALLOWED_ORIGIN), "bad-token"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            AdmissionOutcome::Rejected(Rejection::Captcha(_))
        ));
        assert_eq!(verifier.calls(), 1);
        assert_eq!(stored_count(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_a_rejection() {
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            StubVerifier::passing(),
            Arc::new(BrokenStore),
        );

        let result = gateway
            .admit_request(request(Some(ALLOWED_ORIGIN), "valid-token"))
            .await;
        assert!(matches!(result, Err(StorageError::Database(_))));
    }

    #[tokio::test]
    async fn test_scenario_allowed_origin_valid_token() {
        let mock = MockSiteverify::start().await;
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            turnstile(mock.url(), Duration::from_secs(2)),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some("http://localhost:5173"), "valid-token"))
            .await
            .unwrap();

        assert!(outcome.is_admitted());
        assert_eq!(mock.calls(), 1);
        assert_eq!(stored_count(&gateway).await, 1);
    }

    #[tokio::test]
    async fn test_scenario_evil_origin() {
        let mock = MockSiteverify::start().await;
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            turnstile(mock.url(), Duration::from_secs(2)),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some("http://evil.example"), "valid-token"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AdmissionOutcome::Rejected(Rejection::Origin {
                origin: Some("http://evil.example".to_string())
            })
        );
        assert_eq!(mock.calls(), 0);
        assert_eq!(stored_count(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_scenario_bad_token() {
        let mock = MockSiteverify::start().await;
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            turnstile(mock.url(), Duration::from_secs(2)),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some(ALLOWED_ORIGIN), "bad-token"))
            .await
            .unwrap();

        let AdmissionOutcome::Rejected(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason(), "captcha");
        let Rejection::Captcha(err) = rejection else {
            panic!("expected captcha rejection");
        };
        assert_eq!(err.kind, VerificationErrorKind::RejectedByRemote);
        assert_eq!(err.error_codes, vec!["invalid-input-response"]);
        assert_eq!(stored_count(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_scenario_verification_timeout() {
        let mock = MockSiteverify::start().await;
        let gateway = AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            turnstile(mock.path_url("/slow"), Duration::from_millis(100)),
            migrated_store(),
        );

        let outcome = gateway
            .admit_request(request(Some(ALLOWED_ORIGIN), "valid-token"))
            .await
            .unwrap();

        let AdmissionOutcome::Rejected(Rejection::Captcha(err)) = outcome else {
            panic!("expected captcha rejection, got {outcome:?}");
        };
        assert_eq!(err.kind, VerificationErrorKind::Network);
        assert_eq!(stored_count(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let mock = MockSiteverify::start().await;
        let gateway = Arc::new(AdmissionGateway::new(
            OriginGuard::new([ALLOWED_ORIGIN]),
            turnstile(mock.url(), Duration::from_secs(2)),
            migrated_store(),
        ));

        let mut handles = Vec::new();
        for i in 0..10 {
            let gateway = gateway.clone();
            let token = if i % 2 == 0 { "valid-token" } else { "bad-token" };
            handles.push(tokio::spawn(async move {
                gateway
                    .admit_request(request(Some(ALLOWED_ORIGIN), token))
                    .await
                    .unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_admitted() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(mock.calls(), 10);
        assert_eq!(stored_count(&gateway).await, 5);
    }
}
