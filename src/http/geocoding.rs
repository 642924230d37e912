//! Geocoding passthrough for the static server.
//!
//! `GET /tomtom/search/2/poiSearch/{query}` is relayed to the provider's POI
//! search with the server-side API key attached, so the key never ships to
//! the browser.
//!
//! # Design Decisions
//! - The key is read from the environment at startup and never logged
//! - Provider JSON is relayed as parsed JSON with the provider's status

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::GeocodingConfig;
use crate::http::response::json_error;

/// Provider API key. `Debug` never prints the value.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding API key is not configured")]
    MissingKey,

    #[error("invalid geocoding base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("geocoding base URL cannot carry a path")]
    OpaqueBaseUrl,

    #[error("geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Query parameters accepted from the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct PoiSearchParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_radius() -> u32 {
    5000
}

fn default_limit() -> u32 {
    10
}

/// Client for the provider's search API.
#[derive(Debug, Clone)]
pub struct GeocodingClient {
    http: reqwest::Client,
    base_url: Url,
    key: Option<ApiKey>,
}

impl GeocodingClient {
    /// Build from config, reading the key from `api_key_env`.
    pub fn from_config(config: &GeocodingConfig) -> Result<Self, GeocodingError> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(ApiKey::new);
        Self::new(&config.base_url, key)
    }

    pub fn new(base_url: &str, key: Option<ApiKey>) -> Result<Self, GeocodingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            key,
        })
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Full provider URL for a POI search, key included.
    pub fn search_url(&self, query: &str, params: &PoiSearchParams) -> Result<Url, GeocodingError> {
        let key = self.key.as_ref().ok_or(GeocodingError::MissingKey)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GeocodingError::OpaqueBaseUrl)?
            .pop_if_empty()
            .extend(["search", "2", "poiSearch", format!("{query}.json").as_str()]);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", key.expose());
            if let Some(lat) = params.lat {
                pairs.append_pair("lat", &lat.to_string());
            }
            if let Some(lon) = params.lon {
                pairs.append_pair("lon", &lon.to_string());
            }
            pairs.append_pair("radius", &params.radius.to_string());
            pairs.append_pair("limit", &params.limit.to_string());
        }
        Ok(url)
    }

    /// Run a POI search and return the provider's status and JSON body.
    pub async fn poi_search(
        &self,
        query: &str,
        params: &PoiSearchParams,
    ) -> Result<(StatusCode, serde_json::Value), GeocodingError> {
        let url = self.search_url(query, params)?;
        let response = self.http.get(url).send().await?;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = response.json::<serde_json::Value>().await?;
        Ok((status, body))
    }
}

/// Router exposing the passthrough.
pub fn routes(client: Arc<GeocodingClient>) -> Router {
    Router::new()
        .route("/tomtom/search/2/poiSearch/{query}", get(poi_search_handler))
        .with_state(client)
}

async fn poi_search_handler(
    State(client): State<Arc<GeocodingClient>>,
    Path(query): Path<String>,
    Query(params): Query<PoiSearchParams>,
) -> Response {
    match client.poi_search(&query, &params).await {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(GeocodingError::MissingKey) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Geocoding API key is not configured",
        ),
        Err(err) => {
            // reqwest errors can embed the URL; strip it so the key stays out of logs.
            let err = match err {
                GeocodingError::Request(inner) => GeocodingError::Request(inner.without_url()),
                other => other,
            };
            tracing::error!(error = %err, "Geocoding search failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch from TomTom API")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PoiSearchParams {
        PoiSearchParams {
            lat: Some(30.27),
            lon: Some(-97.74),
            radius: 5000,
            limit: 10,
        }
    }

    #[test]
    fn debug_redacts_key() {
        let client = GeocodingClient::new("https://geo.test", Some(ApiKey::new("s3cr3t"))).unwrap();
        let printed = format!("{client:?}");
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn builds_search_url() {
        let client = GeocodingClient::new("https://geo.test/", Some(ApiKey::new("k1"))).unwrap();
        let url = client.search_url("urgent care", &params()).unwrap();
        assert_eq!(url.path(), "/search/2/poiSearch/urgent%20care.json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("key".into(), "k1".into()),
                ("lat".into(), "30.27".into()),
                ("lon".into(), "-97.74".into()),
                ("radius".into(), "5000".into()),
                ("limit".into(), "10".into()),
            ]
        );
    }

    #[test]
    fn missing_key_is_reported() {
        let client = GeocodingClient::new("https://geo.test", None).unwrap();
        assert!(!client.has_key());
        assert!(matches!(
            client.search_url("pharmacy", &params()),
            Err(GeocodingError::MissingKey)
        ));
    }

    #[test]
    fn params_default_radius_and_limit() {
        let params: PoiSearchParams = serde_json::from_str(r#"{"lat": 1.5}"#).unwrap();
        assert_eq!(params.radius, 5000);
        assert_eq!(params.limit, 10);
        assert_eq!(params.lon, None);
    }
}
