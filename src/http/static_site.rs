//! Static asset and health server.
//!
//! # Routes
//! ```text
//! GET  /health                              → liveness JSON
//! ANY  /api, /api/*   (GET/POST/PUT/DELETE) → api_base_url + remainder
//! GET  /tomtom/search/2/poiSearch/{query}   → geocoding passthrough
//! GET  /*                                   → file under root, else index (SPA)
//! ```
//!
//! CORS is permissive on every response and `OPTIONS` is answered locally.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use url::Url;

use crate::config::{ConfigError, ProxyConfig};
use crate::config::validation::ValidationError;
use crate::health;
use crate::http::geocoding::{self, ApiKey, GeocodingClient};
use crate::http::proxy::{Exchange, ForwardOptions, Forwarder};
use crate::http::response::json_error;
use crate::http::server::with_edge_layers;
use crate::lifecycle::Shutdown;
use crate::net::listener;
use crate::observability::metrics;
use crate::routing::Upstream;
use crate::security::SecurityHeaders;

const API_ROUTE: &str = "api";
const HEALTH_ROUTE: &str = "health";
const GEOCODING_ROUTE: &str = "geocoding";
const ASSET_ROUTE: &str = "static";

/// Where `/api` requests go: an upstream plus the path prefix from `api_base_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    pub upstream: Upstream,
    pub base_path: String,
}

impl ApiTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if url.scheme() != "http" {
            return None;
        }
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self {
            upstream: Upstream::new(host, port),
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Upstream path and query for an inbound `/api...` request.
    pub fn target_for(&self, path: &str, query: Option<&str>) -> String {
        let rest = path.strip_prefix("/api").unwrap_or(path);
        let rest = if rest.is_empty() { "/" } else { rest };
        let mut target = format!("{}{}", self.base_path, rest);
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}

#[derive(Clone)]
struct StaticState {
    forwarder: Forwarder,
    api: Arc<ApiTarget>,
}

/// Static site server.
pub struct StaticServer {
    state: StaticState,
    root: PathBuf,
    index: String,
    version: String,
    geocoding: Option<Arc<GeocodingClient>>,
}

impl StaticServer {
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let geocoding = &config.static_site.geocoding;
        let client = if geocoding.enabled {
            Some(GeocodingClient::from_config(geocoding).map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidGeocodingUrl(
                    geocoding.base_url.clone(),
                )])
            })?)
        } else {
            None
        };
        if client.as_ref().is_some_and(|client| !client.has_key()) {
            tracing::warn!(
                env = %geocoding.api_key_env,
                "Geocoding API key not set; searches will return 503"
            );
        }
        Self::build(config, client)
    }

    /// Like [`StaticServer::new`] but with an explicit geocoding key instead
    /// of reading the environment.
    pub fn with_geocoding_key(config: &ProxyConfig, key: Option<&str>) -> Result<Self, ConfigError> {
        let geocoding = &config.static_site.geocoding;
        let client = GeocodingClient::new(&geocoding.base_url, key.map(ApiKey::new)).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidGeocodingUrl(
                geocoding.base_url.clone(),
            )])
        })?;
        Self::build(config, Some(client))
    }

    fn build(config: &ProxyConfig, geocoding: Option<GeocodingClient>) -> Result<Self, ConfigError> {
        let site = &config.static_site;
        let api = ApiTarget::parse(&site.api_base_url).ok_or_else(|| {
            ConfigError::Validation(vec![ValidationError::InvalidApiBaseUrl(
                site.api_base_url.clone(),
            )])
        })?;

        Ok(Self {
            state: StaticState {
                forwarder: Forwarder::new(&config.timeouts),
                api: Arc::new(api),
            },
            root: PathBuf::from(&site.root),
            index: site.index.clone(),
            version: site.version.clone(),
            geocoding: geocoding.map(Arc::new),
        })
    }

    pub fn api_target(&self) -> &ApiTarget {
        &self.state.api
    }

    /// The complete service with all middleware layers.
    pub fn app(&self) -> Router {
        let api: MethodRouter<StaticState> = get(api_handler)
            .post(api_handler)
            .put(api_handler)
            .delete(api_handler);

        let mut router = Router::new()
            .route("/api", api.clone())
            .route("/api/", api.clone())
            .route("/api/{*rest}", api)
            .with_state(self.state.clone())
            .merge(health::routes(&self.version));

        if let Some(client) = &self.geocoding {
            router = router.merge(geocoding::routes(client.clone()));
        }

        let assets = ServeDir::new(&self.root).fallback(ServeFile::new(self.root.join(&self.index)));
        let router = router
            .fallback_service(assets)
            .layer(middleware::from_fn(record_request));

        with_edge_layers(router, Arc::new(SecurityHeaders::permissive_cors()))
    }

    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        listener::serve_http(listener, self.app(), shutdown.signal()).await
    }
}

async fn api_handler(State(state): State<StaticState>, request: Request<Body>) -> Response {
    let target = state
        .api
        .target_for(request.uri().path(), request.uri().query());
    tracing::debug!(method = %request.method(), target = %target, "Forwarding API request");

    let options = ForwardOptions {
        change_origin: true,
        forwarded_headers: true,
    };
    match state
        .forwarder
        .forward(Exchange::new(), request, &state.api.upstream, &target, options)
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(upstream = %state.api.upstream, error = %err, "API proxy error");
            metrics::record_upstream_error(API_ROUTE);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to connect to backend")
        }
    }
}

/// Metrics label for a static-server path.
fn route_label(path: &str) -> &'static str {
    if path == "/api" || path.starts_with("/api/") {
        API_ROUTE
    } else if path == "/health" {
        HEALTH_ROUTE
    } else if path.starts_with("/tomtom/") {
        GEOCODING_ROUTE
    } else {
        ASSET_ROUTE
    }
}

async fn record_request(request: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let route = route_label(request.uri().path());
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), route, start_time);
    response
}
