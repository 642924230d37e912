//! Edge Router
//!
//! Host-based reverse proxy with TLS termination, plus a static asset
//! server for the single-page app.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                 EDGE ROUTER                  │
//!   Client Request    │  ┌─────────┐   ┌─────────┐   ┌───────────┐   │
//!   ──────────────────┼─▶│   net   │──▶│  http   │──▶│  routing  │   │
//!                     │  │ tls/tcp │   │ server  │   │ host rule │   │
//!                     │  └─────────┘   └─────────┘   └─────┬─────┘   │
//!                     │                                    ▼         │
//!   Client Response   │  ┌──────────┐  ┌─────────┐   ┌───────────┐   │
//!   ◀─────────────────┼──│ security │◀─│  proxy  │◀──│  upstream │◀──┼── Backend
//!                     │  │ headers  │  │ stream  │   │  client   │   │
//!                     │  └──────────┘  └─────────┘   └───────────┘   │
//!                     │                                              │
//!                     │   config · lifecycle · observability         │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! `route` runs the domain router, `serve` runs the static asset / health
//! server, `check` validates a config and prints the route table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use edge_router::config::{self, ProxyConfig};
use edge_router::lifecycle::{self, Shutdown, StartupError};
use edge_router::observability::{self, metrics};
use edge_router::{HttpServer, StaticServer};

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "Host-based reverse proxy and static asset server", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long, env = "EDGE_ROUTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the domain router
    Route,
    /// Run the static asset and health server
    Serve {
        /// Listen port, replacing the port of every configured listener
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },
    /// Validate the configuration and print the route table
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Fatal error");
            eprintln!("edge-router: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = config::load_or_default(cli.config.as_deref())?;
    observability::init_logging(&config.observability, cli.log_level.as_deref());

    match cli.command {
        Commands::Check => {
            let table = edge_router::RouteTable::from_config(&config.router);
            print!("{table}");
            Ok(())
        }
        Commands::Route => {
            let shutdown = start_background(&config)?;
            let server = HttpServer::new(&config);
            let routes = server
                .routes()
                .rules()
                .iter()
                .map(|rule| format!("{}->{}", rule.name, rule.upstream))
                .chain(std::iter::once(format!(
                    "default->{}",
                    server.routes().default_upstream()
                )))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-router starting");
            lifecycle::run_server(
                "router",
                server.app(),
                &routes,
                &config.router.listener,
                &config.timeouts,
                &shutdown,
            )
            .await
        }
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.static_site.listener.override_port(port);
            }
            let shutdown = start_background(&config)?;
            let server = StaticServer::new(&config)?;
            let routes = format!(
                "/health, /api -> {}{}, /* -> {}",
                server.api_target().upstream,
                server.api_target().base_path,
                config.static_site.root
            );
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-router static server starting");
            lifecycle::run_server(
                "static",
                server.app(),
                &routes,
                &config.static_site.listener,
                &config.timeouts,
                &shutdown,
            )
            .await
        }
    }
}

/// Metrics exporter and signal handler shared by both servers.
fn start_background(config: &ProxyConfig) -> Result<Shutdown, StartupError> {
    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Metrics(format!(
                "invalid metrics address {:?}",
                config.observability.metrics_address
            )))?;
        metrics::init_metrics(addr).map_err(|err| StartupError::Metrics(err.to_string()))?;
    }

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(shutdown.clone());
    Ok(shutdown)
}
