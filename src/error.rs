//! Error types for the Fleet Manager
//!
//! The registry itself never fails: the only negative outcome of a core
//! operation is a heartbeat for an unknown node, which is reported as a
//! plain `false`. These errors cover configuration, startup and shutdown.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the fleet manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Server Lifecycle Errors
    // =========================================================================
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} did not stop within {grace:?}")]
    ShutdownTimeout { task: String, grace: Duration },

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by operator input rather than runtime state
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::Bind { .. })
    }
}

/// Result type alias for the fleet manager
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::Configuration("sweep interval must be non-zero".into()).is_configuration());

        let bind = Error::Bind {
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.is_configuration());

        let timeout = Error::ShutdownTimeout {
            task: "liveness sweeper".into(),
            grace: Duration::from_secs(10),
        };
        assert!(!timeout.is_configuration());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::ShutdownTimeout {
            task: "liveness sweeper".into(),
            grace: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "liveness sweeper did not stop within 2s");
    }
}
