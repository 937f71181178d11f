//! Fleet Manager
//!
//! Cloud-edge coordinator: accepts node registrations and heartbeats over
//! HTTP and sweeps silent nodes offline.

use anyhow::Context;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleet_manager::{
    metrics::serve_metrics, registry::log_events, ApiServer, ApiServerConfig, FleetMetrics,
    LivenessSweeper, NodeRegistry, SweeperConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Fleet Manager - liveness tracking for edge nodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: IpAddr,

    /// REST API port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: SocketAddr,

    /// Seconds between liveness sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "30")]
    sweep_interval_secs: u64,

    /// Seconds without a heartbeat before a node is marked offline
    #[arg(long, env = "NODE_TIMEOUT_SECS", default_value = "180")]
    node_timeout_secs: u64,

    /// Heartbeat cadence advertised to nodes
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value = "60")]
    heartbeat_interval_secs: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "15")]
    request_timeout_secs: u64,

    /// Grace period for shutdown in seconds
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "10")]
    shutdown_grace_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Fleet Manager");
    info!("  Version: {}", fleet_manager::VERSION);
    info!("  REST API: {}:{}", args.bind_addr, args.port);
    info!("  Metrics: {}", args.metrics_addr);
    info!(
        "  Sweep every {}s, offline after {}s",
        args.sweep_interval_secs, args.node_timeout_secs
    );

    let grace = Duration::from_secs(args.shutdown_grace_secs);
    let registry = NodeRegistry::new();

    let sweeper = LivenessSweeper::new(
        SweeperConfig {
            interval: Duration::from_secs(args.sweep_interval_secs),
            timeout: Duration::from_secs(args.node_timeout_secs),
        },
        registry.clone(),
    )
    .context("invalid liveness sweeper configuration")?;

    let api_config = ApiServerConfig {
        bind_addr: SocketAddr::new(args.bind_addr, args.port),
        heartbeat_interval_secs: args.heartbeat_interval_secs,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..Default::default()
    };

    let metrics = Arc::new(FleetMetrics::new(registry.clone()).context("failed to create metrics")?);

    // Root token: cancelled by a signal or by the API server exiting
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down gracefully...");
            shutdown.cancel();
        }
    });

    let sweeper_handle = sweeper.spawn(shutdown.child_token());
    let event_log = tokio::spawn(log_events(registry.subscribe(), shutdown.child_token()));

    let metrics_task = tokio::spawn({
        let addr = args.metrics_addr;
        let token = shutdown.child_token();
        async move {
            if let Err(e) = serve_metrics(addr, metrics, token).await {
                error!("Metrics server error: {}", e);
            }
        }
    });

    let api_server = ApiServer::new(api_config, registry.clone());
    let server = api_server.run(shutdown.clone());
    tokio::pin!(server);

    let api_result = tokio::select! {
        result = &mut server => result,
        _ = shutdown.cancelled() => match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                warn!("REST server did not drain within {:?}", grace);
                Ok(())
            }
        },
    };

    shutdown.cancel();

    if let Err(e) = sweeper_handle.stop(grace).await {
        warn!("Liveness sweeper shutdown: {}", e);
    }
    if tokio::time::timeout(grace, metrics_task).await.is_err() {
        warn!("Metrics server did not stop within {:?}", grace);
    }
    let _ = event_log.await;

    api_result.context("REST server failed")?;

    info!("Server stopped");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,tower=warn,tower_http=info,axum=info",
            level.to_string().to_lowercase()
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Signals
// =============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
