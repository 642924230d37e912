//! End-to-end tests for the static asset / health server.

use std::collections::HashMap;
use std::fs;

use axum::{
    extract::{Path, Query},
    routing::get,
    Json, Router,
};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

use edge_router::health::HealthReport;
use edge_router::{ProxyConfig, StaticServer};

mod common;

fn site_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "<html>hospital finder</html>").unwrap();
    fs::create_dir(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("assets/app.js"), "console.log('app');").unwrap();
    dir
}

fn config(root: &TempDir, api_port: u16, geocoding_port: u16) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.static_site.root = root.path().to_string_lossy().into_owned();
    config.static_site.version = "9.9.9".into();
    config.static_site.api_base_url = format!("http://127.0.0.1:{api_port}/api");
    config.static_site.geocoding.base_url = format!("http://127.0.0.1:{geocoding_port}");
    config
}

/// Mock provider: echoes the path segment and query parameters as JSON.
async fn start_geocoding_mock() -> u16 {
    let app = Router::new().route(
        "/search/2/poiSearch/{query}",
        get(
            |Path(query): Path<String>, Query(params): Query<HashMap<String, String>>| async move {
                Json(json!({ "query": query, "params": params, "results": [] }))
            },
        ),
    );
    common::serve_backend(app).await.port()
}

#[tokio::test]
async fn health_reports_ok_and_version() {
    let root = site_root();
    let server = StaticServer::with_geocoding_key(&config(&root, 1, 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: HealthReport = res.json().await.unwrap();
    assert_eq!(report.status, "ok");
    assert_eq!(report.version, "9.9.9");
    assert!(!report.timestamp.is_empty());
    shutdown.trigger();
}

#[tokio::test]
async fn serves_files_with_spa_fallback() {
    let root = site_root();
    let server = StaticServer::with_geocoding_key(&config(&root, 1, 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;
    let client = common::client();

    let res = client.get(format!("http://{addr}/assets/app.js")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.text().await.unwrap(), "console.log('app');");

    let res = client.get(format!("http://{addr}/hospitals/42")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "<html>hospital finder</html>");
    shutdown.trigger();
}

#[tokio::test]
async fn api_requests_are_forwarded() {
    let root = site_root();
    let backend = common::start_echo_backend("api").await;
    let server = StaticServer::with_geocoding_key(&config(&root, backend.port(), 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .put(format!("http://{addr}/api/hospitals/7?notify=true"))
        .header("content-type", "application/json")
        .body(r#"{"beds":12}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-seen-method"], "PUT");
    assert_eq!(res.headers()["x-seen-path"], "/api/hospitals/7?notify=true");
    assert_eq!(
        res.headers()["access-control-allow-headers"],
        "Origin, X-Requested-With, Content-Type, Accept, Authorization"
    );
    assert_eq!(res.text().await.unwrap(), r#"{"beds":12}"#);
    shutdown.trigger();
}

#[tokio::test]
async fn api_root_with_trailing_slash_is_forwarded() {
    let root = site_root();
    let backend = common::start_echo_backend("api").await;
    let server = StaticServer::with_geocoding_key(&config(&root, backend.port(), 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;
    let client = common::client();

    for (method, url, seen) in [
        (Method::GET, format!("http://{addr}/api"), "/api/"),
        (Method::GET, format!("http://{addr}/api/"), "/api/"),
        (Method::GET, format!("http://{addr}/api/?x=1"), "/api/?x=1"),
        (Method::POST, format!("http://{addr}/api/"), "/api/"),
    ] {
        let res = client.request(method.clone(), &url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{method} {url}");
        assert_eq!(res.headers()["x-backend"], "api", "{method} {url}");
        assert_eq!(res.headers()["x-seen-method"], method.as_str());
        assert_eq!(res.headers()["x-seen-path"], seen, "{method} {url}");
    }
    shutdown.trigger();
}

#[tokio::test]
async fn api_failure_is_json_500() {
    let root = site_root();
    let dead = common::closed_port().await;
    let server = StaticServer::with_geocoding_key(&config(&root, dead, 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .get(format!("http://{addr}/api/hospitals"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to connect to backend" }));
    shutdown.trigger();
}

#[tokio::test]
async fn preflight_is_answered_locally() {
    let root = site_root();
    let dead = common::closed_port().await;
    let server = StaticServer::with_geocoding_key(&config(&root, dead, 1), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .request(Method::OPTIONS, format!("http://{addr}/api/hospitals"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-methods"], "GET, POST, PUT, DELETE, OPTIONS");
    assert!(res.bytes().await.unwrap().is_empty());
    shutdown.trigger();
}

#[tokio::test]
async fn geocoding_search_attaches_key() {
    let root = site_root();
    let provider = start_geocoding_mock().await;
    let server =
        StaticServer::with_geocoding_key(&config(&root, 1, provider), Some("test-key")).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .get(format!("http://{addr}/tomtom/search/2/poiSearch/hospital?lat=30.5&lon=-97.25"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["query"], "hospital.json");
    assert_eq!(body["params"]["key"], "test-key");
    assert_eq!(body["params"]["lat"], "30.5");
    assert_eq!(body["params"]["lon"], "-97.25");
    assert_eq!(body["params"]["radius"], "5000");
    assert_eq!(body["params"]["limit"], "10");
    shutdown.trigger();
}

#[tokio::test]
async fn geocoding_without_key_is_unavailable() {
    let root = site_root();
    let provider = start_geocoding_mock().await;
    let server = StaticServer::with_geocoding_key(&config(&root, 1, provider), None).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .get(format!("http://{addr}/tomtom/search/2/poiSearch/hospital"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Geocoding API key is not configured" }));
    shutdown.trigger();
}

#[tokio::test]
async fn geocoding_provider_failure_is_json_500() {
    let root = site_root();
    let dead = common::closed_port().await;
    let server = StaticServer::with_geocoding_key(&config(&root, 1, dead), Some("test-key")).unwrap();
    let (addr, shutdown) = common::start_static(server).await;

    let res = common::client()
        .get(format!("http://{addr}/tomtom/search/2/poiSearch/pharmacy"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to fetch from TomTom API" }));
    shutdown.trigger();
}
