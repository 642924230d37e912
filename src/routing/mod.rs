//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header or :authority)
//!     → matcher.rs (extract + normalize host)
//!     → router.rs (ordered substring scan)
//!     → Return: Forward { route, upstream } or Reject
//!
//! Route Compilation (at startup):
//!     RouteConfig[] + default_upstream
//!     → Compile matchers (lowercased needles)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same host always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{normalize_host, request_host, HostMatcher};
pub use router::{RouteDecision, RouteRule, RouteTable, RouteTableBuilder, Upstream, DEFAULT_ROUTE};
