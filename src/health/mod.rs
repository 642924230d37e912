//! Health endpoint subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → report.rs (status + timestamp + version)
//!     → JSON 200
//! ```
//!
//! # Design Decisions
//! - Liveness only: no upstream is contacted
//! - Version fixed at startup, timestamp taken per request

pub mod report;

pub use report::{routes, HealthReport};
