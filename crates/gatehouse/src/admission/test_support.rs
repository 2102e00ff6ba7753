//! Test doubles: a local siteverify server and in-process verifiers/stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use rusqlite::Connection;
use serde_json::{Value, json};

use gatehouse_common::{
    NewContactMessage, RecordId, RecordQuery, StorageError, StoredRecord, VerificationError,
    VerificationResult,
};

use super::CaptchaVerifier;
use crate::storage::{MigrationLedger, RecordStore, SqliteStore, bundled};

pub const TEST_SECRET: &str = "test-secret-key";
pub const ALLOWED_ORIGIN: &str = "http://localhost:5173";

#[derive(Clone, Default)]
struct MockState {
    calls: Arc<AtomicUsize>,
    last_remote_ip: Arc<Mutex<Option<String>>>,
}

/// Local stand-in for the Turnstile siteverify endpoint.
///
/// `valid-token` passes, anything else fails with `invalid-input-response`,
/// and a wrong secret fails with `invalid-input-secret`.
pub struct MockSiteverify {
    base: String,
    state: MockState,
}

impl MockSiteverify {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/turnstile/v0/siteverify", post(siteverify))
            .route("/slow", post(slow))
            .route("/garbage", post(garbage))
            .route("/unavailable", post(unavailable))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self) -> String {
        self.path_url("/turnstile/v0/siteverify")
    }

    pub fn path_url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn last_remote_ip(&self) -> Option<String> {
        self.state.last_remote_ip.lock().unwrap().clone()
    }
}

async fn siteverify(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last_remote_ip.lock().unwrap() = body["remoteip"].as_str().map(str::to_string);

    if body["secret"] != TEST_SECRET {
        return Json(json!({ "success": false, "error-codes": ["invalid-input-secret"] }));
    }
    if body["response"] == "valid-token" {
        Json(json!({ "success": true, "hostname": "localhost", "error-codes": [] }))
    } else {
        Json(json!({ "success": false, "error-codes": ["invalid-input-response"] }))
    }
}

async fn slow(State(state): State<MockState>) -> Json<Value> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "success": true }))
}

async fn garbage(State(state): State<MockState>) -> &'static str {
    state.calls.fetch_add(1, Ordering::SeqCst);
    "<html>definitely not json</html>"
}

async fn unavailable(State(state): State<MockState>) -> StatusCode {
    state.calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

/// In-process verifier with a fixed answer and a call counter
pub struct StubVerifier {
    result: VerificationResult,
    calls: AtomicUsize,
}

impl StubVerifier {
    pub fn passing() -> Arc<Self> {
        Arc::new(Self {
            result: VerificationResult::passed(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: VerificationError) -> Arc<Self> {
        Arc::new(Self {
            result: VerificationResult::failed(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaVerifier for StubVerifier {
    async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> VerificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Store whose writes always fail
pub struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn write(&self, _record: &NewContactMessage) -> Result<RecordId, StorageError> {
        Err(StorageError::Database("disk I/O error".to_string()))
    }

    async fn read(&self, _query: &RecordQuery) -> Result<Vec<StoredRecord>, StorageError> {
        Err(StorageError::Database("disk I/O error".to_string()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("broken".to_string()))
    }
}

/// Fresh in-memory store with the bundled schema applied
pub fn migrated_store() -> Arc<SqliteStore> {
    let mut conn = Connection::open_in_memory().unwrap();
    let ledger = MigrationLedger::new(bundled()).unwrap();
    ledger.apply_pending(&mut conn).unwrap();
    Arc::new(SqliteStore::new(conn, &ledger).unwrap())
}

pub fn sample_message() -> NewContactMessage {
    NewContactMessage::create(
        "IDEA",
        "user@example.com".to_string(),
        "Jane Smith".to_string(),
        "Feature request".to_string(),
        None,
    )
    .unwrap()
}
