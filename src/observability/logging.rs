//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick pretty or JSON output from config
//! - Resolve the level filter (`RUST_LOG` > CLI flag > config)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - A second init (tests, embedding) is a no-op, not a panic

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
///
/// `override_level` comes from the command line and beats the config file;
/// `RUST_LOG`, when set, beats both.
pub fn init_logging(config: &ObservabilityConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("edge_router={level},tower_http={level}"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
