//! Mirror proxy
//!
//! Forwards every request to one upstream origin.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 MIRROR PROXY                 │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!   ─────────────────────┼─▶│  http   │──▶│ routing  │──▶│ upstream  │──┼──▶ Upstream
//!                        │  │ server  │   │ (router) │   │  client   │  │
//!                        │  └─────────┘   └────┬─────┘   └─────┬─────┘  │
//!                        │                     │ upgrade       │        │
//!                        │                ┌────▼─────┐    ┌────▼─────┐  │
//!   Client Response      │                │websocket │    │ response │  │
//!   ◀────────────────────┼────────────────│  pump    │    │  relay   │  │
//!                        │                └──────────┘    │+ rewrite │  │
//!                        │                                └──────────┘  │
//!                        │  config · observability · lifecycle          │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mirror_proxy::config::loader::{read_config, ConfigError};
use mirror_proxy::config::validation::validate_config;
use mirror_proxy::lifecycle::signals::shutdown_on_signal;
use mirror_proxy::observability::{logging, metrics};
use mirror_proxy::{HttpServer, ProxyConfig, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "mirror-proxy", version, about = "Single-upstream reverse proxy")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Override the upstream host.
    #[arg(long, env = "MIRROR_UPSTREAM_HOST")]
    upstream_host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(host) = cli.upstream_host {
        config.upstream.host = host;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!("mirror-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %format!("{}://{}", config.upstream.scheme, config.upstream.host),
        rewrite = config.rewrite.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, shutdown.clone())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
