//! Fleet Manager - Cloud-Edge Coordinator
//!
//! Tracks the liveness of edge devices ("nodes") that check in with a central
//! coordinator. Nodes register once, send periodic heartbeats, and are demoted
//! to `offline` by a background sweeper when they go quiet.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Fleet Manager                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐        ┌──────────────────────────┐  │
//! │  │   REST API (axum)   │        │   Liveness Sweeper       │  │
//! │  │ register/heartbeat/ │        │  (interval + cancel      │  │
//! │  │ list/get            │        │   token)                 │  │
//! │  └──────────┬──────────┘        └────────────┬─────────────┘  │
//! │             │                                │                 │
//! │             └───────────────┬────────────────┘                 │
//! │                             │                                  │
//! │                 ┌───────────┴───────────┐                      │
//! │                 │     Node Registry     │──── events / metrics │
//! │                 │   (RwLock<HashMap>)   │                      │
//! │                 └───────────────────────┘                      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Node records, the registry, its clock and events
//! - [`sweeper`]: Periodic offline sweeping
//! - [`api`]: REST transport
//! - [`metrics`]: Prometheus exposition
//! - [`error`]: Error types and handling

pub mod api;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod sweeper;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use error::{Error, Result};

pub use metrics::FleetMetrics;

pub use registry::{
    Clock, ManualClock, Node, NodeId, NodeRegistration, NodeRegistry, NodeStatus, RegistryEvent,
    RegistryStatsSnapshot, StatusCounts, SystemClock,
};

pub use sweeper::{LivenessSweeper, SweeperConfig, SweeperHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
