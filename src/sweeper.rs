//! Liveness Sweeper
//!
//! Periodically demotes nodes that stopped sending heartbeats. The sweeper is
//! the only actor that moves a node from online to offline; it runs on its own
//! timer regardless of request traffic and stops when its cancellation token
//! fires.

use crate::error::{Error, Result};
use crate::registry::NodeRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the liveness sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Heartbeat age after which an online node is considered offline
    pub timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(180),
        }
    }
}

impl SweeperConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Configuration(
                "sweep interval must be greater than zero".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(Error::Configuration(
                "node timeout must be greater than zero".into(),
            ));
        }
        if self.timeout < self.interval {
            warn!(
                interval_secs = self.interval.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                "node timeout is shorter than the sweep interval; nodes may stay online past the timeout"
            );
        }
        Ok(())
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Periodic driver of [`NodeRegistry::sweep_stale`]
#[derive(Debug)]
pub struct LivenessSweeper {
    config: SweeperConfig,
    registry: Arc<NodeRegistry>,
}

impl LivenessSweeper {
    /// Create a sweeper, rejecting zero durations
    pub fn new(config: SweeperConfig, registry: Arc<NodeRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run a single sweep and return how many nodes went offline
    pub fn sweep(&self) -> usize {
        let count = self.registry.sweep_stale(self.config.timeout);
        if count > 0 {
            info!(count, "marked nodes offline");
        } else {
            debug!("sweep found no stale nodes");
        }
        count
    }

    /// Start sweeping on a background task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> SweeperHandle {
        let task_token = token.clone();
        let task = tokio::spawn(async move { self.run(task_token).await });
        SweeperHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "liveness sweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // A slow tick shifts the schedule instead of bursting to catch up
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        info!("liveness sweeper stopped");
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Control handle for a running sweeper
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Whether the background task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the sweeper and wait up to `grace` for it to exit.
    ///
    /// A sweep already in progress always runs to completion. If the task
    /// has not exited when the grace period ends it is aborted.
    pub async fn stop(mut self, grace: Duration) -> Result<()> {
        self.token.cancel();

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Internal(format!("liveness sweeper task failed: {}", e))),
            Err(_) => {
                self.task.abort();
                Err(Error::ShutdownTimeout {
                    task: "liveness sweeper".into(),
                    grace,
                })
            }
        }
    }
}
