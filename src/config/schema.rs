//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge router and static server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host-based domain router.
    pub router: RouterConfig,

    /// Static asset / health server.
    pub static_site: StaticSiteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Security response headers.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration shared by both servers.
///
/// When a listener table is written out, only the listeners it names are
/// started; the defaults apply only when the table is absent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ListenerConfig {
    /// Plain HTTP bind address (e.g., "0.0.0.0:80"). `None` disables HTTP.
    #[serde(default)]
    pub http_address: Option<String>,

    /// Optional TLS listener.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: Some("0.0.0.0:80".to_string()),
            tls: None,
        }
    }
}

impl ListenerConfig {
    /// Replace the port of every configured listener, keeping its IP.
    /// Addresses that do not parse are left for validation to report.
    pub fn override_port(&mut self, port: u16) {
        fn with_port(address: &mut String, port: u16) {
            if let Ok(mut addr) = address.parse::<std::net::SocketAddr>() {
                addr.set_port(port);
                *address = addr.to_string();
            }
        }
        if let Some(address) = self.http_address.as_mut() {
            with_port(address, port);
        }
        if let Some(tls) = self.tls.as_mut() {
            with_port(&mut tls.bind_address, port);
        }
    }
}

/// What to do when the certificate or key cannot be loaded.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsFailurePolicy {
    /// Refuse to start.
    Abort,
    /// Warn and serve plain HTTP only.
    #[default]
    FallbackHttp,
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// HTTPS bind address.
    #[serde(default = "default_tls_bind_address")]
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Behaviour when the credential cannot be loaded.
    #[serde(default)]
    pub on_error: TlsFailurePolicy,

    /// Generate a self-signed pair with `openssl` when neither file exists.
    /// Development only.
    #[serde(default)]
    pub generate_self_signed: bool,
}

fn default_tls_bind_address() -> String {
    "0.0.0.0:443".to_string()
}

/// Handling of requests whose host matches no explicit route.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedHostPolicy {
    /// Send to the default upstream.
    #[default]
    Forward,
    /// Answer 421 Misdirected Request.
    Reject,
}

/// Domain router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    pub listener: ListenerConfig,

    /// Ordered host rules, first match wins.
    pub routes: Vec<RouteConfig>,

    /// Target used when no rule matches.
    pub default_upstream: UpstreamConfig,

    pub unmatched_host: UnmatchedHostPolicy,

    /// Rewrite `Host` to the upstream's own authority.
    pub change_origin: bool,

    /// Append X-Forwarded-For/Host/Proto.
    pub forwarded_headers: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: vec![
                RouteConfig {
                    name: "api".to_string(),
                    host_contains: "api.example.com".to_string(),
                    upstream_host: "localhost".to_string(),
                    upstream_port: 3015,
                },
                RouteConfig {
                    name: "app".to_string(),
                    host_contains: "example.com".to_string(),
                    upstream_host: "localhost".to_string(),
                    upstream_port: 3002,
                },
            ],
            default_upstream: UpstreamConfig::default(),
            unmatched_host: UnmatchedHostPolicy::default(),
            change_origin: true,
            forwarded_headers: true,
        }
    }
}

/// A host rule mapping requests to one upstream.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Substring the normalized host must contain.
    pub host_contains: String,

    pub upstream_host: String,

    pub upstream_port: u16,
}

/// Upstream address without a match condition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UpstreamConfig {
    pub upstream_host: String,
    pub upstream_port: u16,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            upstream_host: "localhost".to_string(),
            upstream_port: 3002,
        }
    }
}

/// Static asset / health server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticSiteConfig {
    pub listener: ListenerConfig,

    /// Directory served for `GET /*`.
    pub root: String,

    /// Single-page-app entry point, relative to `root`.
    pub index: String,

    /// Base URL that `/api/*` is forwarded to; the remainder after `/api`
    /// is appended.
    pub api_base_url: String,

    /// Version reported by `/health`.
    pub version: String,

    pub geocoding: GeocodingConfig,
}

impl Default for StaticSiteConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig {
                http_address: Some("0.0.0.0:3002".to_string()),
                tls: None,
            },
            root: ".".to_string(),
            index: "index.html".to_string(),
            api_base_url: "http://localhost:3015/api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            geocoding: GeocodingConfig::default(),
        }
    }
}

/// Third-party POI search passthrough.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub enabled: bool,

    /// Search API base URL.
    pub base_url: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.tomtom.com".to_string(),
            api_key_env: "TOMTOM_API_KEY".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to send response headers, in seconds.
    pub upstream_response_secs: u64,

    /// Grace period for in-flight requests after a shutdown signal.
    pub shutdown_drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_response_secs: 30,
            shutdown_drain_secs: 10,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers on router responses.
    pub enable_headers: bool,

    /// Ordered header set applied to every router response.
    pub headers: Vec<HeaderEntry>,
}

/// One response header.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            headers: vec![
                HeaderEntry::new("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
                HeaderEntry::new("X-Frame-Options", "SAMEORIGIN"),
                HeaderEntry::new("X-Content-Type-Options", "nosniff"),
                HeaderEntry::new("X-XSS-Protection", "1; mode=block"),
                HeaderEntry::new("Referrer-Policy", "strict-origin-when-cross-origin"),
                HeaderEntry::new("Access-Control-Allow-Origin", "*"),
                HeaderEntry::new("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"),
                HeaderEntry::new("Access-Control-Allow-Headers", "Content-Type, Authorization"),
            ],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
