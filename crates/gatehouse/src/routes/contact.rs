//! Contact-us submission endpoint.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use gatehouse_common::constants::{FALLBACK_CLIENT_IP, headers};
use gatehouse_common::{AdmissionOutcome, NewContactMessage, Rejection};

use super::response::ApiResponse;
use crate::admission::AdmissionRequest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateContactMessageRequest {
    /// Turnstile token from the widget
    token: String,
    category: String,
    email: String,
    name: String,
    message: String,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

/// Accept a contact submission.
///
/// Returns:
/// - 200: Stored
/// - 400: Malformed body or invalid fields
/// - 401: Turnstile verification failed
/// - 403: Origin not allowed
/// - 500: Verification misconfigured or storage failure
pub async fn create_contact_message(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let origin = request_headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    // Refuse foreign origins before the body is even parsed
    if let Err(rejection) = state.gateway.check_origin(origin) {
        return ApiResponse::<()>::failure(rejection.status_code(), "Forbidden").into_response();
    }

    let payload: CreateContactMessageRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse request body");
            return ApiResponse::<()>::failure(400, "Invalid request body").into_response();
        }
    };

    let record = match NewContactMessage::create(
        &payload.category,
        payload.email,
        payload.name,
        payload.message,
        payload.data,
    ) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected invalid submission");
            return ApiResponse::<()>::failure(400, e.to_string()).into_response();
        }
    };

    let request = AdmissionRequest {
        origin: origin.map(str::to_string),
        token: payload.token,
        remote_ip: Some(client_ip(&request_headers)),
        record,
    };

    match state.gateway.admit_request(request).await {
        Ok(AdmissionOutcome::Admitted { .. }) => ApiResponse::success(true).into_response(),
        Ok(AdmissionOutcome::Rejected(rejection)) => {
            let status = rejection.status_code();
            let message = match rejection {
                Rejection::Origin { .. } => "Forbidden",
                Rejection::Captcha(_) if status >= 500 => "Internal Server Error",
                Rejection::Captcha(_) => "Request validation failed",
            };
            ApiResponse::<()>::failure(status, message).into_response()
        }
        Err(e) => ApiResponse::<()>::failure(e.status_code(), "Failed to save message").into_response(),
    }
}

/// Client address as reported by the edge, for Turnstile's `remoteip`
fn client_ip(request_headers: &HeaderMap) -> String {
    header_value(request_headers, headers::CF_CONNECTING_IP)
        .or_else(|| {
            header_value(request_headers, headers::X_FORWARDED_FOR)
                .and_then(|chain| chain.split(',').next())
                .map(str::trim)
        })
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

fn header_value<'a>(request_headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request_headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_cloudflare_header() {
        let mut map = HeaderMap::new();
        map.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.1"));
        map.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&map), "198.51.100.1");
    }

    #[test]
    fn test_client_ip_falls_back_to_forwarded_for() {
        let mut map = HeaderMap::new();
        map.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&map), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_default() {
        assert_eq!(client_ip(&HeaderMap::new()), "0.0.0.0");
    }
}
