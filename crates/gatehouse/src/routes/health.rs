//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use gatehouse_common::MigrationStatus;

use super::response::ApiResponse;
use crate::state::AppState;

/// Basic health check (is the server running?)
pub async fn health_check() -> ApiResponse<bool> {
    ApiResponse::success(true)
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    version: &'static str,
    environment: &'static str,
    database: bool,
    migrations: MigrationStatus,
}

/// Readiness check (does the store answer?)
pub async fn ready_check(State(state): State<AppState>) -> Result<Json<ReadyResponse>, StatusCode> {
    if let Err(e) = state.gateway.store().ping().await {
        tracing::warn!(error = %e, "Readiness probe failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(ReadyResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.as_str(),
        database: true,
        migrations: state.migrations,
    }))
}
