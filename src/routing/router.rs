//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the upstream for a normalized host
//! - Apply the unmatched-host policy
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) substring scan, first match wins
//! - The default rule always exists and is always last

use std::fmt;

use crate::config::{RouterConfig, UnmatchedHostPolicy, UpstreamConfig};
use crate::routing::matcher::HostMatcher;

/// Name reported for the implicit last rule.
pub const DEFAULT_ROUTE: &str = "default";

/// An upstream `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, as used in the upstream URI and a rewritten `Host`.
    /// IPv6 literals are bracketed.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&UpstreamConfig> for Upstream {
    fn from(config: &UpstreamConfig) -> Self {
        Self::new(config.upstream_host.clone(), config.upstream_port)
    }
}

/// A compiled host rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    pub matcher: HostMatcher,
    pub upstream: Upstream,
}

/// Outcome of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision<'a> {
    /// Forward to this upstream.
    Forward { route: &'a str, upstream: &'a Upstream },
    /// No explicit rule matched and the policy rejects such hosts.
    Reject,
}

/// Immutable, ordered route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    default: Upstream,
    unmatched: UnmatchedHostPolicy,
}

impl RouteTable {
    /// Compile the router section of the configuration.
    pub fn from_config(config: &RouterConfig) -> Self {
        let mut builder = Self::builder().default_upstream(
            config.default_upstream.upstream_host.clone(),
            config.default_upstream.upstream_port,
        );
        for route in &config.routes {
            builder = builder.route(
                route.name.clone(),
                route.host_contains.clone(),
                route.upstream_host.clone(),
                route.upstream_port,
            );
        }
        builder.unmatched_host(config.unmatched_host).build()
    }

    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Route a normalized host. Pure: same host, same decision.
    pub fn route(&self, host: Option<&str>) -> RouteDecision<'_> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matcher.matches(host)) {
            return RouteDecision::Forward {
                route: &rule.name,
                upstream: &rule.upstream,
            };
        }
        match self.unmatched {
            UnmatchedHostPolicy::Forward => RouteDecision::Forward {
                route: DEFAULT_ROUTE,
                upstream: &self.default,
            },
            UnmatchedHostPolicy::Reject => RouteDecision::Reject,
        }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn default_upstream(&self) -> &Upstream {
        &self.default
    }

    pub fn unmatched_policy(&self) -> UnmatchedHostPolicy {
        self.unmatched
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{:<12} *{}* -> {}", rule.name, rule.matcher.needle(), rule.upstream)?;
        }
        match self.unmatched {
            UnmatchedHostPolicy::Forward => writeln!(f, "{:<12} * -> {}", DEFAULT_ROUTE, self.default),
            UnmatchedHostPolicy::Reject => writeln!(f, "{:<12} * -> 421 Misdirected Request", DEFAULT_ROUTE),
        }
    }
}

/// Builder for [`RouteTable`]; rules keep the order they are added in.
#[derive(Debug)]
pub struct RouteTableBuilder {
    rules: Vec<RouteRule>,
    default: Upstream,
    unmatched: UnmatchedHostPolicy,
}

impl Default for RouteTableBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default: Upstream::from(&UpstreamConfig::default()),
            unmatched: UnmatchedHostPolicy::default(),
        }
    }
}

impl RouteTableBuilder {
    pub fn route(
        mut self,
        name: impl Into<String>,
        host_contains: impl Into<String>,
        upstream_host: impl Into<String>,
        upstream_port: u16,
    ) -> Self {
        self.rules.push(RouteRule {
            name: name.into(),
            matcher: HostMatcher::new(host_contains),
            upstream: Upstream::new(upstream_host, upstream_port),
        });
        self
    }

    pub fn default_upstream(mut self, host: impl Into<String>, port: u16) -> Self {
        self.default = Upstream::new(host, port);
        self
    }

    pub fn unmatched_host(mut self, policy: UnmatchedHostPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            rules: self.rules,
            default: self.default,
            unmatched: self.unmatched,
        }
    }
}
