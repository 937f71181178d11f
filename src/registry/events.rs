//! Registry Events
//!
//! Events emitted by the node registry for external consumers to react to
//! node lifecycle changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events emitted by the node registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A node registered for the first time
    NodeRegistered { node_id: String, node_type: String },

    /// An existing node registered again and had its fields overwritten
    NodeReregistered { node_id: String },

    /// A node missed the liveness timeout and was swept offline
    NodeWentOffline { node_id: String },

    /// An offline node came back through a heartbeat or re-registration
    NodeCameOnline { node_id: String },
}

impl RegistryEvent {
    /// ID of the node the event refers to
    pub fn node_id(&self) -> &str {
        match self {
            RegistryEvent::NodeRegistered { node_id, .. }
            | RegistryEvent::NodeReregistered { node_id }
            | RegistryEvent::NodeWentOffline { node_id }
            | RegistryEvent::NodeCameOnline { node_id } => node_id,
        }
    }
}

impl std::fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEvent::NodeRegistered { node_id, node_type } => {
                write!(f, "node {} ({}) registered", node_id, node_type)
            }
            RegistryEvent::NodeReregistered { node_id } => {
                write!(f, "node {} re-registered", node_id)
            }
            RegistryEvent::NodeWentOffline { node_id } => write!(f, "node {} went offline", node_id),
            RegistryEvent::NodeCameOnline { node_id } => write!(f, "node {} came online", node_id),
        }
    }
}

/// Log registry events until the channel closes or `shutdown` fires.
///
/// Liveness transitions are logged at `info`, registrations at `debug`.
pub async fn log_events(mut events: broadcast::Receiver<RegistryEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(event @ (RegistryEvent::NodeWentOffline { .. } | RegistryEvent::NodeCameOnline { .. })) => {
                    info!(node_id = event.node_id(), "{}", event);
                }
                Ok(event) => debug!(node_id = event.node_id(), "{}", event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "registry event log fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_log_events_exits_when_channel_closes() {
        let (tx, rx) = broadcast::channel(4);
        let task = tokio::spawn(log_events(rx, CancellationToken::new()));

        tx.send(RegistryEvent::NodeCameOnline {
            node_id: "edge-1".into(),
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_events_exits_on_shutdown() {
        let (_tx, rx) = broadcast::channel::<RegistryEvent>(4);
        let token = CancellationToken::new();
        let task = tokio::spawn(log_events(rx, token.clone()));

        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_event_display() {
        let event = RegistryEvent::NodeRegistered {
            node_id: "edge-1".into(),
            node_type: "picclaw".into(),
        };
        assert_eq!(event.to_string(), "node edge-1 (picclaw) registered");
        assert_eq!(event.node_id(), "edge-1");

        let event = RegistryEvent::NodeWentOffline {
            node_id: "edge-2".into(),
        };
        assert_eq!(event.to_string(), "node edge-2 went offline");
    }
}
