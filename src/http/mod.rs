//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs / static_site.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → [routing decides upstream]
//!     → proxy.rs (rewrite, forward, stream back)
//!     → response.rs (local error responses)
//!     → Send to client
//! ```

pub mod geocoding;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod static_site;

pub use proxy::{ExchangePhase, ForwardedProto, ProxyError};
pub use request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
pub use static_site::StaticServer;
