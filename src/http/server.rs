//! Domain router HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, security headers)
//! - Resolve the request host to a route and forward upstream
//! - Record per-request metrics
//!
//! # Design Decisions
//! - Every path and method lands in one fallback handler
//! - One `Response` per request; forwarding errors become 502/504 here

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::proxy::{Exchange, ForwardOptions, Forwarder};
use crate::http::request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
use crate::http::response;
use crate::lifecycle::Shutdown;
use crate::net::listener;
use crate::observability::metrics;
use crate::routing::{request_host, RouteDecision, RouteTable, DEFAULT_ROUTE};
use crate::security::{security_headers_middleware, SecurityHeaders};

/// Application state injected into handlers.
#[derive(Clone)]
struct AppState {
    routes: Arc<RouteTable>,
    forwarder: Forwarder,
    options: ForwardOptions,
}

/// Host-based reverse proxy.
pub struct HttpServer {
    state: AppState,
    security: Arc<SecurityHeaders>,
}

impl HttpServer {
    /// Build the router from its config section.
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_routes(RouteTable::from_config(&config.router), config)
    }

    /// Use an explicitly built route table; everything else comes from `config`.
    pub fn with_routes(routes: RouteTable, config: &ProxyConfig) -> Self {
        let state = AppState {
            routes: Arc::new(routes),
            forwarder: Forwarder::new(&config.timeouts),
            options: ForwardOptions {
                change_origin: config.router.change_origin,
                forwarded_headers: config.router.forwarded_headers,
            },
        };
        Self {
            state,
            security: Arc::new(SecurityHeaders::from_config(&config.security)),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.state.routes
    }

    /// The complete service with all middleware layers.
    pub fn app(&self) -> Router {
        let router = Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone());
        with_edge_layers(router, self.security.clone())
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        listener::serve_http(listener, self.app(), shutdown.signal()).await
    }
}

/// Stack shared by both servers: request id, trace span, security headers.
pub fn with_edge_layers(router: Router, security: Arc<SecurityHeaders>) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            security,
            security_headers_middleware,
        ))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
}

/// Main proxy handler.
/// Looks up the route for the request host and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let host = request_host(&request);
    let request_id = request.request_id().to_string();
    let client = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());

    let (route, upstream) = match state.routes.route(host.as_deref()) {
        RouteDecision::Forward { route, upstream } => (route, upstream),
        RouteDecision::Reject => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %request.uri().path(),
                host = host.as_deref().unwrap_or("-"),
                "Rejecting unmatched host"
            );
            let response = response::misdirected(host.as_deref());
            metrics::record_request(method.as_str(), response.status().as_u16(), DEFAULT_ROUTE, start_time);
            return response;
        }
    };

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        host = host.as_deref().unwrap_or("-"),
        client = client.as_deref().unwrap_or("-"),
        route = %route,
        upstream = %upstream,
        "Proxying request"
    );

    let response = match state
        .forwarder
        .forward(Exchange::new(), request, upstream, &path_and_query, state.options)
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                route = %route,
                upstream = %upstream,
                error = %err,
                "Upstream request failed"
            );
            metrics::record_upstream_error(route);
            response::proxy_error(&err)
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), route, start_time);
    response
}
