//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (OPTIONS answered locally)
//!     → Pass to routing / static handlers
//! Outgoing response:
//!     → headers.rs (Security Header Set stamped last)
//! ```
//!
//! # Design Decisions
//! - Header set is read-only after startup
//! - Local headers take precedence over upstream ones

pub mod headers;

pub use headers::{security_headers_middleware, SecurityHeaders};
