//! dispatch-proxy
//!
//! Single-port HTTP/WebSocket dispatch proxy built with Tokio and Hyper.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  DISPATCH PROXY                  │
//!                     │                                                  │
//!   Client ───────────┼─▶ net::listener ─▶ http::server ─▶ routing      │
//!                     │                                     │            │
//!                     │                                     ▼            │
//!                     │                              backend registry    │
//!                     │                                     │            │
//!                     │                                     ▼            │
//!   Client ◀──────────┼── http::response ◀── http::forwarder ◀──────────┼──── Backend
//!                     │                          │ (101)                 │
//!                     │                          ▼                       │
//!                     │                    net::splice (raw bytes)       │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dispatch_proxy::config::validation::validate_config;
use dispatch_proxy::config::{load_config, ProxyConfig};
use dispatch_proxy::lifecycle::{termination_signal, Shutdown};
use dispatch_proxy::net::Listener;
use dispatch_proxy::observability::{logging, metrics};
use dispatch_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "dispatch-proxy")]
#[command(about = "Single-port dispatch proxy for HTTP and WebSocket backends", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("dispatch-proxy: {message}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!(
            "configuration OK: {} backend(s), {} route(s), fallback '{}'",
            config.backends.len(),
            config.routes.len(),
            config.routing.fallback
        );
        return ExitCode::SUCCESS;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatch-proxy starting");

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, String> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => ProxyConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    })?;
    Ok(config)
}

async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        backends = config.backends.len(),
        routes = config.routes.len(),
        match_mode = ?config.routing.match_mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config)?;
    let listener = Listener::bind(&server.config().listener).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.trigger_on(termination_signal());

    server.run(listener, receiver).await?;
    Ok(())
}
