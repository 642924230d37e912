//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    GeocodingConfig, HeaderEntry, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    RouteConfig, RouterConfig, SecurityConfig, StaticSiteConfig, TimeoutConfig, TlsConfig,
    TlsFailurePolicy, UnmatchedHostPolicy, UpstreamConfig,
};
