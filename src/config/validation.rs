//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check addresses, header names and upstream URLs parse
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::{ListenerConfig, ProxyConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: String, value: String },

    #[error("{0}: no listener configured (set http_address or tls)")]
    NoListener(String),

    #[error("route {0:?} is defined more than once")]
    DuplicateRoute(String),

    #[error("route {0:?}: host_contains must not be empty")]
    EmptyHostMatch(String),

    #[error("{0}: upstream_host must not be empty")]
    EmptyUpstreamHost(String),

    #[error("{0}: upstream_port must be between 1 and 65535")]
    InvalidUpstreamPort(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("security header {0:?} has an invalid name or value")]
    InvalidHeader(String),

    #[error("static_site.api_base_url {0:?} is not a plain http URL")]
    InvalidApiBaseUrl(String),

    #[error("static_site.geocoding.base_url {0:?} is not an http(s) URL")]
    InvalidGeocodingUrl(String),
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener("router.listener", &config.router.listener, &mut errors);
    validate_listener("static_site.listener", &config.static_site.listener, &mut errors);

    let mut names = HashSet::new();
    for route in &config.router.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if route.host_contains.trim().is_empty() {
            errors.push(ValidationError::EmptyHostMatch(route.name.clone()));
        }
        let field = format!("router.routes[{}]", route.name);
        if route.upstream_host.trim().is_empty() {
            errors.push(ValidationError::EmptyUpstreamHost(field.clone()));
        }
        if route.upstream_port == 0 {
            errors.push(ValidationError::InvalidUpstreamPort(field));
        }
    }

    let default = &config.router.default_upstream;
    if default.upstream_host.trim().is_empty() {
        errors.push(ValidationError::EmptyUpstreamHost("router.default_upstream".into()));
    }
    if default.upstream_port == 0 {
        errors.push(ValidationError::InvalidUpstreamPort("router.default_upstream".into()));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.upstream_response_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("upstream_response_secs"));
    }

    for entry in &config.security.headers {
        if HeaderName::from_bytes(entry.name.as_bytes()).is_err()
            || HeaderValue::from_str(&entry.value).is_err()
        {
            errors.push(ValidationError::InvalidHeader(entry.name.clone()));
        }
    }

    if !is_url_with_scheme(&config.static_site.api_base_url, &["http"]) {
        errors.push(ValidationError::InvalidApiBaseUrl(
            config.static_site.api_base_url.clone(),
        ));
    }
    let geocoding = &config.static_site.geocoding;
    if geocoding.enabled && !is_url_with_scheme(&geocoding.base_url, &["http", "https"]) {
        errors.push(ValidationError::InvalidGeocodingUrl(geocoding.base_url.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(field: &str, listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.http_address.is_none() && listener.tls.is_none() {
        errors.push(ValidationError::NoListener(field.to_string()));
    }
    if let Some(addr) = &listener.http_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: format!("{field}.http_address"),
                value: addr.clone(),
            });
        }
    }
    if let Some(tls) = &listener.tls {
        if tls.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: format!("{field}.tls.bind_address"),
                value: tls.bind_address.clone(),
            });
        }
    }
}

fn is_url_with_scheme(raw: &str, schemes: &[&str]) -> bool {
    Url::parse(raw)
        .map(|url| schemes.contains(&url.scheme()) && url.host().is_some())
        .unwrap_or(false)
}
