//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve TLS for a server's listener set
//! - Bind every listener before any starts serving
//! - Run the listeners until shutdown, then drain with a deadline
//!
//! # Design Decisions
//! - Fail fast: any bind or TLS (abort policy) error is fatal
//! - Listeners start last (traffic only when ready)
//! - One listener failing stops the others

use std::io;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{ConfigError, ListenerConfig, TimeoutConfig};
use crate::lifecycle::Shutdown;
use crate::net::{self, ListenerError, TlsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("{server}: no listener to start")]
    NoListener { server: &'static str },

    #[error("{server} {scheme} listener on {address} failed: {source}")]
    Serve {
        server: &'static str,
        scheme: &'static str,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("metrics exporter failed to start: {0}")]
    Metrics(String),
}

/// Addresses a server will actually listen on once TLS is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPlan {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ListenerPlan {
    /// `tls_ready` says whether TLS material loaded. Without it, a TLS-only
    /// listener set serves plain HTTP on the TLS bind address.
    pub fn new(listeners: &ListenerConfig, tls_ready: bool) -> Self {
        let https = listeners
            .tls
            .as_ref()
            .filter(|_| tls_ready)
            .map(|tls| tls.bind_address.clone());
        let http = match (&listeners.http_address, &listeners.tls) {
            (Some(addr), _) => Some(addr.clone()),
            (None, Some(tls)) if !tls_ready => Some(tls.bind_address.clone()),
            (None, _) => None,
        };
        Self { http, https }
    }
}

/// Run one server (`label` names it in logs) on its configured listeners
/// until `shutdown` fires.
///
/// `routes` is a one-line summary for the startup banner.
pub async fn run_server(
    label: &'static str,
    app: Router,
    routes: &str,
    listeners: &ListenerConfig,
    timeouts: &TimeoutConfig,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let rustls = match &listeners.tls {
        Some(tls) => net::resolve_tls(tls).await?,
        None => None,
    };
    let plan = ListenerPlan::new(listeners, rustls.is_some());

    let http = match &plan.http {
        Some(addr) => Some(net::bind(addr).await?),
        None => None,
    };
    let https = match (&plan.https, rustls) {
        (Some(addr), Some(config)) => Some((net::bind(addr).await?, config)),
        _ => None,
    };

    let drain = Duration::from_secs(timeouts.shutdown_drain_secs);
    let mut tasks = JoinSet::new();

    if let Some(listener) = http {
        let address = local_address(&listener);
        tracing::info!(server = label, scheme = "http", address = %address, routes = %routes, "Listening");
        let (app, signal) = (app.clone(), shutdown.signal());
        tasks.spawn(async move {
            net::serve_http(listener, app, signal)
                .await
                .map_err(|source| StartupError::Serve {
                    server: label,
                    scheme: "http",
                    address,
                    source,
                })
        });
    }

    if let Some((listener, config)) = https {
        let address = local_address(&listener);
        tracing::info!(server = label, scheme = "https", address = %address, routes = %routes, "Listening");
        let (app, signal) = (app.clone(), shutdown.signal());
        tasks.spawn(async move {
            net::serve_https(listener, app, config, signal, drain)
                .await
                .map_err(|source| StartupError::Serve {
                    server: label,
                    scheme: "https",
                    address,
                    source,
                })
        });
    }

    if tasks.is_empty() {
        return Err(StartupError::NoListener { server: label });
    }

    let mut outcome = Ok(());
    let signal = shutdown.signal();
    tokio::select! {
        finished = tasks.join_next() => {
            // A listener stopped on its own; take the rest down with it.
            if let Some(result) = finished {
                outcome = flatten(result);
            }
            shutdown.trigger();
        }
        _ = signal => {}
    }

    let drained = tokio::time::timeout(drain, async {
        let mut first_error = Ok(());
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = flatten(result) {
                tracing::error!(server = label, error = %err, "Listener failed during shutdown");
                if first_error.is_ok() {
                    first_error = Err(err);
                }
            }
        }
        first_error
    })
    .await;

    match drained {
        Ok(result) => {
            if outcome.is_ok() {
                outcome = result;
            }
        }
        Err(_) => {
            tracing::warn!(server = label, drain_secs = drain.as_secs(), "Drain deadline passed, closing remaining connections");
            tasks.abort_all();
        }
    }

    tracing::info!(server = label, "Server stopped");
    outcome
}

fn local_address(listener: &tokio::net::TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn flatten(
    result: Result<Result<(), StartupError>, tokio::task::JoinError>,
) -> Result<(), StartupError> {
    match result {
        Ok(inner) => inner,
        Err(join_err) => Err(StartupError::Serve {
            server: "listener",
            scheme: "-",
            address: "-".to_string(),
            source: io::Error::other(join_err.to_string()),
        }),
    }
}
