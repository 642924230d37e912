//! Security and CORS response headers.
//!
//! # Responsibilities
//! - Hold the ordered Security Header Set
//! - Stamp it on every response, overriding upstream values
//! - Answer CORS preflight (`OPTIONS`) without touching any upstream
//!
//! # Design Decisions
//! - The set wins over upstream headers of the same name
//! - Built once at startup, shared via Arc

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;

/// Ordered header name → value set.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Build from config. Invalid entries are skipped with a warning;
    /// validation rejects them before this point.
    pub fn from_config(config: &SecurityConfig) -> Self {
        if !config.enable_headers {
            return Self::default();
        }
        let mut headers = Self::default();
        for entry in &config.headers {
            match (
                HeaderName::from_bytes(entry.name.as_bytes()),
                HeaderValue::from_str(&entry.value),
            ) {
                (Ok(name), Ok(value)) => headers.entries.push((name, value)),
                _ => tracing::warn!(header = %entry.name, "Skipping invalid security header"),
            }
        }
        headers
    }

    /// Permissive CORS set used by the static server.
    pub fn permissive_cors() -> Self {
        Self::from_static(&[
            ("access-control-allow-origin", "*"),
            ("access-control-allow-methods", "GET, POST, PUT, DELETE, OPTIONS"),
            (
                "access-control-allow-headers",
                "Origin, X-Requested-With, Content-Type, Accept, Authorization",
            ),
        ])
    }

    pub fn from_static(pairs: &[(&'static str, &'static str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
                .collect(),
        }
    }

    /// Insert every entry, replacing existing values of the same name.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.entries {
            headers.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Middleware: short-circuit preflight, then stamp the header set.
pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        tracing::debug!(path = %request.uri().path(), "Answering preflight locally");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        headers.apply(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    headers.apply(response.headers_mut());
    response
}
