//! Aggregator gateway binary.
//!
//! Loads configuration, wires the observability callbacks into the default
//! executor, and serves the aggregate endpoint until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use aggregator_gateway::aggregate::{DefaultExecutor, ExecutorOptions, FetchLatency, FetchLogger};
use aggregator_gateway::config::{load_config, GatewayConfig};
use aggregator_gateway::{observability, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "aggregator-gateway")]
#[command(about = "HTTP request aggregation gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    observability::logging::init_tracing(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_url = %config.upstream.base_url,
        default_timeout_ms = config.aggregate.default_timeout_ms,
        max_timeout_ms = config.aggregate.max_timeout_ms,
        max_request = config.aggregate.max_request,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.upstream.connect_secs))
        .pool_max_idle_per_host(config.upstream.pool_idle_per_host)
        .build()?;

    let fetch_latency: FetchLatency = Arc::new(|duration, method, route_pattern, status| {
        observability::metrics::record_fetch(duration, method, route_pattern, status);
    });

    let fetch_logger: FetchLogger = Arc::new(|duration, method, path, status, request_id| {
        tracing::info!(
            method = %method,
            path = %path,
            status,
            duration_ms = duration.as_millis() as u64,
            request_id = %request_id,
            "Upstream fetch completed"
        );
    });

    let executor = DefaultExecutor::new(
        &config.upstream.base_url,
        ExecutorOptions {
            client: Some(client),
            default_timeout: Duration::from_millis(config.aggregate.default_timeout_ms),
            max_timeout: Duration::from_millis(config.aggregate.max_timeout_ms),
            max_request: config.aggregate.max_request,
            fetch_latency: Some(fetch_latency),
            fetch_logger: Some(fetch_logger),
        },
    )?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::new(config, Arc::new(executor));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
