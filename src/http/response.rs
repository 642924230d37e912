//! Locally generated responses.
//!
//! # Responsibilities
//! - Map forwarding errors to 502/504 with a short diagnostic body
//! - Build the JSON error envelopes used by the static server
//! - Answer rejected hosts with 421
//!
//! # Design Decisions
//! - Bodies are short and never echo request data beyond the host name
//! - Upstream responses are not touched here; they stream through as-is

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::proxy::ProxyError;

/// `text/plain` response for a failed forwarding attempt.
pub fn proxy_error(err: &ProxyError) -> Response {
    let mut response = (err.status(), format!("Proxy error: {err}")).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// `{"error": message}` with the given status.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Host matched no rule and the policy says reject.
pub fn misdirected(host: Option<&str>) -> Response {
    let body = match host {
        Some(host) => format!("No route for host {host}"),
        None => "No route for request without a Host header".to_string(),
    };
    (StatusCode::MISDIRECTED_REQUEST, body).into_response()
}
