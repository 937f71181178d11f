//! Prometheus metrics exposition
//!
//! Served on a dedicated listener. Gauges and counters are synchronised
//! from the node registry on every scrape.

use crate::error::{Error, Result};
use crate::registry::{NodeRegistry, NodeStatus};
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fleet metrics backed by a private Prometheus registry
pub struct FleetMetrics {
    prometheus: Registry,
    fleet: Arc<NodeRegistry>,
    nodes_total: IntGauge,
    nodes_by_status: IntGaugeVec,
    registrations: IntCounter,
    heartbeats: IntCounter,
    heartbeat_misses: IntCounter,
    sweeps: IntCounter,
    marked_offline: IntCounter,
}

impl FleetMetrics {
    pub fn new(fleet: Arc<NodeRegistry>) -> Result<Self> {
        let prometheus = Registry::new();

        let nodes_total = IntGauge::new("fleet_nodes_total", "Total number of registered nodes")?;
        let nodes_by_status = IntGaugeVec::new(
            Opts::new("fleet_nodes", "Registered nodes by liveness status"),
            &["status"],
        )?;
        let registrations = IntCounter::new(
            "fleet_registrations_total",
            "Node registrations, including re-registrations",
        )?;
        let heartbeats = IntCounter::new("fleet_heartbeats_total", "Accepted heartbeats")?;
        let heartbeat_misses = IntCounter::new(
            "fleet_heartbeat_misses_total",
            "Heartbeats rejected because the node never registered",
        )?;
        let sweeps = IntCounter::new("fleet_sweeps_total", "Completed liveness sweeps")?;
        let marked_offline = IntCounter::new(
            "fleet_nodes_marked_offline_total",
            "Nodes transitioned to offline by liveness sweeps",
        )?;

        prometheus.register(Box::new(nodes_total.clone()))?;
        prometheus.register(Box::new(nodes_by_status.clone()))?;
        prometheus.register(Box::new(registrations.clone()))?;
        prometheus.register(Box::new(heartbeats.clone()))?;
        prometheus.register(Box::new(heartbeat_misses.clone()))?;
        prometheus.register(Box::new(sweeps.clone()))?;
        prometheus.register(Box::new(marked_offline.clone()))?;

        Ok(Self {
            prometheus,
            fleet,
            nodes_total,
            nodes_by_status,
            registrations,
            heartbeats,
            heartbeat_misses,
            sweeps,
            marked_offline,
        })
    }

    /// Pull current values from the node registry
    pub fn refresh(&self) {
        let counts = self.fleet.counts();
        self.nodes_total.set(counts.total as i64);
        for (status, count) in [
            (NodeStatus::Online, counts.online),
            (NodeStatus::Offline, counts.offline),
            (NodeStatus::Degraded, counts.degraded),
        ] {
            self.nodes_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }

        let stats = self.fleet.stats();
        sync_counter(&self.registrations, stats.registrations + stats.reregistrations);
        sync_counter(&self.heartbeats, stats.refreshes);
        sync_counter(&self.heartbeat_misses, stats.refresh_misses);
        sync_counter(&self.sweeps, stats.sweeps);
        sync_counter(&self.marked_offline, stats.marked_offline);
    }

    /// Refresh and encode in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        self.refresh();

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.prometheus.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics not UTF-8: {}", e)))
    }
}

/// Counters only go up; the registry stats are monotonic so the delta is never negative
fn sync_counter(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

/// Router exposing `/metrics`
pub fn metrics_router(metrics: Arc<FleetMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .with_state(metrics)
}

async fn scrape(State(metrics): State<Arc<FleetMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Metrics encoding failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve metrics on `addr` until `shutdown` is cancelled
pub async fn serve_metrics(
    addr: SocketAddr,
    metrics: Arc<FleetMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;

    info!(addr = %addr, "Metrics server listening");

    axum::serve(listener, metrics_router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))
}
