//! Fleet API Server
//!
//! Serves the REST API until the shutdown token is cancelled, then drains
//! in-flight requests.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::rest::RestRouter;
use crate::registry::NodeRegistry;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub bind_addr: SocketAddr,
    /// Heartbeat cadence advertised to nodes in heartbeat responses
    pub heartbeat_interval_secs: u64,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            heartbeat_interval_secs: 60,
            request_timeout: Duration::from_secs(15),
            max_body_size: 64 * 1024, // 64KB
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server for the fleet
pub struct ApiServer {
    config: ApiServerConfig,
    registry: Arc<NodeRegistry>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, registry: Arc<NodeRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    /// Run the API server until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.bind_addr;
        let app = RestRouter::new(self.registry.clone(), self.config.clone()).build();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "Fleet Manager listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }
}
