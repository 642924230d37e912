//! Edge Router Library

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{HttpServer, StaticServer};
pub use lifecycle::Shutdown;
pub use routing::RouteTable;
