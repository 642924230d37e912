//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (bind, classify bind errors)
//!     → tls.rs (optional: load/generate certs, TLS policy, HTTPS serving)
//!     → Hand off to the Axum app
//! ```
//!
//! # Design Decisions
//! - All listeners are bound before any starts serving
//! - TLS is optional; its failure policy is decided per listener set

pub mod listener;
pub mod tls;

pub use listener::{bind, serve_http, ListenerError};
pub use tls::{load_tls_config, resolve_tls, serve_https, TlsError};
