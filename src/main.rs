//! HTTP tunnel endpoint.
//!
//! Runs one side of an HTTP-over-gRPC tunnel.
//!
//! # Architecture Overview
//!
//! ```text
//!  forward mode                                   receive mode
//! ┌───────────────────────────────┐              ┌───────────────────────────────┐
//! │ ForwardServer (axum)          │              │ ReceiveServer (tonic)         │
//! │   → Forwarder                 │   one call   │   → Receiver                  │
//! │       → GrpcChannel::open ────┼─────────────▶│       → UpstreamHandler ──────┼──▶ Backend
//! │       ◀ response messages ◀───┼──────────────┼─── ◀ ResponseWriter           │
//! └───────────────────────────────┘  per request └───────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use http_tunnel::config::{load_config, Mode, TunnelConfig};
use http_tunnel::lifecycle::{wait_for_signal, Shutdown};
use http_tunnel::observability::{logging, metrics};
use http_tunnel::{ForwardServer, Forwarder, GrpcChannel, ReceiveServer, Receiver, UpstreamHandler};

/// In-flight exchanges get this long to finish after a shutdown signal.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "http-tunnel", version, about = "Tunnel HTTP requests over a gRPC stream")]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured side of the tunnel.
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TunnelConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), mode = ?config.mode, "http-tunnel starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal.trigger();
    });

    match config.mode {
        Mode::Forward => run_forward(&config, &shutdown).await?,
        Mode::Receive => run_receive(&config, &shutdown).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_forward(config: &TunnelConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let forward = &config.forward;
    let channel = GrpcChannel::connect_lazy(&forward.upstream, Duration::from_secs(forward.connect_timeout_secs))?;
    let forwarder = Forwarder::new(channel).with_chunk_size(forward.chunk_size);

    let listener = TcpListener::bind(&forward.listen_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        upstream = %forward.upstream,
        chunk_size = forward.chunk_size,
        "Forwarding HTTP over the tunnel"
    );

    let server = ForwardServer::new(forwarder).run(listener, shutdown.subscribe());
    if let Some(result) = shutdown.drain(server, DRAIN_DEADLINE).await {
        result?;
    }
    Ok(())
}

async fn run_receive(config: &TunnelConfig, shutdown: &Shutdown) -> Result<(), Box<dyn std::error::Error>> {
    let receive = &config.receive;
    let handler = UpstreamHandler::new(&receive.backend_address)?;

    let listener = TcpListener::bind(&receive.listen_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        backend = %receive.backend_address,
        "Receiving tunnelled HTTP"
    );

    let server = ReceiveServer::new(Receiver::new(handler)).run(listener, shutdown.subscribe());
    if let Some(result) = shutdown.drain(server, DRAIN_DEADLINE).await {
        result?;
    }
    Ok(())
}
