//! Host extraction and matching.
//!
//! # Responsibilities
//! - Pull the routing host out of a request (Host header, then URI authority)
//! - Normalize it (strip port, lowercase)
//! - Match a normalized host against a rule's substring
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Substring match, not a domain-suffix parse: `api.example.com` matches
//!   `api.example.com.evil.net` too, so rule order matters
//! - Malformed hosts normalize to `None` and match no rule

use std::str::FromStr;

use axum::http::{header, uri::Authority, Request};

/// Strip the port suffix and lowercase a raw `Host` value.
///
/// Returns `None` for empty or unparseable hosts. IPv6 literals keep their
/// brackets (`[::1]:8080` → `[::1]`).
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let authority = Authority::from_str(raw).ok()?;
    // Userinfo has no business in a Host header.
    if authority.as_str().contains('@') {
        return None;
    }
    let host = authority.host();
    if host.is_empty() {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// The normalized routing host of a request.
///
/// HTTP/1.1 clients send `Host`; HTTP/2 clients may only send `:authority`,
/// which hyper exposes as the URI authority.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(value) = req.headers().get(header::HOST) {
        return value.to_str().ok().and_then(normalize_host);
    }
    req.uri()
        .authority()
        .and_then(|authority| normalize_host(authority.as_str()))
}

/// Matches a normalized host against a substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatcher {
    needle: String,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The needle is normalized to lowercase for case-insensitive matching.
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into().trim().to_ascii_lowercase(),
        }
    }

    /// Returns true if the host contains the needle.
    pub fn matches(&self, host: Option<&str>) -> bool {
        host.is_some_and(|host| host.contains(&self.needle))
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }
}
