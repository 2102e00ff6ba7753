//! HTTP route handlers for Gatehouse.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use gatehouse_common::constants::{MAX_BODY_BYTES, PREFLIGHT_MAX_AGE_SECS, routes};

use crate::admission::OriginGuard;
use crate::state::AppState;

mod contact;
mod health;
mod response;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.gateway.guard());

    Router::new()
        // Health & Status
        .route(routes::HEALTH_CHECK, get(health::health_check))
        .route(routes::READY, get(health::ready_check))

        // Submissions
        .route(routes::CONTACT_US, post(contact::create_contact_message))

        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

/// CORS headers for the allowlisted origins only; preflight answered here
fn cors_layer(guard: &OriginGuard) -> CorsLayer {
    let origins: Vec<HeaderValue> = guard
        .origins()
        .filter(|o| *o != "*")
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}
