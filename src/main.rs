//! connpool
//!
//! Dials the configured backends into a least-loaded connection pool, probes
//! one of them, and serves the aggregate health status until signalled.
//!
//! ```text
//!   connpool.toml ──▶ config ──▶ Client::connect ──▶ dial targets ──▶ balancer task
//!                                      │
//!                                      └──▶ health() ──▶ HealthState ──▶ GET /health
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use connpool::config::load_config;
use connpool::health::serve_health;
use connpool::lifecycle::signals::wait_for_signal;
use connpool::observability::{logging, metrics};
use connpool::{Client, HttpChannel, HttpDialer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "connpool", version, about = "Least-loaded connection pool client")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "connpool.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "connpool starting");

    tracing::info!(
        service = %config.service.name,
        targets = config.service.targets.len(),
        request_timeout_ms = ?config.balancer.request_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let dialer = HttpDialer::new(&config.transport);
    let client = Client::connect(&config, dialer, |channel: &HttpChannel| channel.clone()).await?;

    let status = client.health().await?;
    tracing::info!(status = status.as_str(), "Initial health check complete");

    let shutdown = Shutdown::new();
    let health_task = if config.health_endpoint.enabled {
        let listener = TcpListener::bind(&config.health_endpoint.bind_address).await?;
        Some(tokio::spawn(serve_health(
            listener,
            client.health_status(),
            shutdown.subscribe(),
        )))
    } else {
        None
    };

    wait_for_signal().await;

    shutdown.trigger();
    client.close().await;
    if let Some(task) = health_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Health endpoint failed"),
            Err(e) => tracing::error!(error = %e, "Health endpoint task panicked"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
