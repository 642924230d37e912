//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;

use edge_router::{HttpServer, ProxyConfig, RouteTable, Shutdown, StaticServer};

/// Start an echo backend on an ephemeral port.
///
/// The response body is the request body, byte for byte. What the backend
/// saw is reported in `x-seen-*` headers, and every response carries
/// `x-backend: <name>` plus `x-frame-options: DENY` to exercise header
/// precedence.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(echo).with_state(name);
    serve_backend(app).await
}

async fn echo(State(name): State<&'static str>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();

    let seen = |headers: &HeaderMap, key: &str| {
        headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();

    (
        [
            ("x-backend", name.to_string()),
            ("x-frame-options", "DENY".to_string()),
            ("x-seen-method", parts.method.to_string()),
            ("x-seen-path", path),
            ("x-seen-host", seen(&parts.headers, "host")),
            ("x-seen-forwarded-for", seen(&parts.headers, "x-forwarded-for")),
            ("x-seen-forwarded-host", seen(&parts.headers, "x-forwarded-host")),
            ("x-seen-forwarded-proto", seen(&parts.headers, "x-forwarded-proto")),
            ("x-seen-connection", seen(&parts.headers, "connection")),
        ],
        bytes,
    )
        .into_response()
}

/// Serve any axum app on an ephemeral port for the rest of the test.
pub async fn serve_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start the domain router for `routes`; returns its address and shutdown handle.
pub async fn start_router(routes: RouteTable, config: &ProxyConfig) -> (SocketAddr, Shutdown) {
    let server = HttpServer::with_routes(routes, config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });
    (addr, shutdown)
}

/// Start a static server; returns its address and shutdown handle.
pub async fn start_static(server: StaticServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });
    (addr, shutdown)
}

/// Client that never pools or goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
