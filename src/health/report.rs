//! Liveness report served at `/health`.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Body of a `/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    pub version: String,
}

impl HealthReport {
    pub fn now(version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: version.to_string(),
        }
    }
}

/// Router exposing `GET /health`.
pub fn routes(version: &str) -> Router {
    let version: Arc<str> = Arc::from(version);
    Router::new().route(
        "/health",
        get(move || {
            let version = version.clone();
            async move { Json(HealthReport::now(&version)) }
        }),
    )
}
