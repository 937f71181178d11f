//! Node Registry
//!
//! The authoritative map from node ID to node record. Every mutation takes the
//! write half of a single reader-writer lock; lookups and snapshots take the
//! read half. The lock is only ever held while touching the map.

use super::clock::{Clock, SystemClock};
use super::events::RegistryEvent;
use super::node::{Node, NodeId, NodeRegistration, NodeStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Registry Statistics
// =============================================================================

/// Monotonic operation counters
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// First-time registrations
    pub registrations: AtomicU64,
    /// Registrations that overwrote an existing record
    pub reregistrations: AtomicU64,
    /// Successful heartbeats
    pub refreshes: AtomicU64,
    /// Heartbeats for unknown nodes
    pub refresh_misses: AtomicU64,
    /// Completed sweeps
    pub sweeps: AtomicU64,
    /// Nodes transitioned online -> offline by sweeps
    pub marked_offline: AtomicU64,
}

impl RegistryStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            reregistrations: self.reregistrations.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_misses: self.refresh_misses.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            marked_offline: self.marked_offline.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub registrations: u64,
    pub reregistrations: u64,
    pub refreshes: u64,
    pub refresh_misses: u64,
    pub sweeps: u64,
    pub marked_offline: u64,
}

/// Node counts per status at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub degraded: usize,
}

// =============================================================================
// Node Registry
// =============================================================================

/// Concurrency-safe store of node records
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, Node>>,
    clock: Arc<dyn Clock>,
    stats: RegistryStats,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_count", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl NodeRegistry {
    /// Create a new node registry using the system clock
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new node registry reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
            clock,
            stats: RegistryStats::default(),
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Register a node, or overwrite an existing node with the same ID.
    ///
    /// The stored record is always `online` with `last_seen` set to now.
    pub fn register(&self, registration: NodeRegistration) -> Node {
        let mut events = Vec::with_capacity(2);

        let stored = {
            let mut nodes = self.nodes.write();
            let now = self.clock.now();

            match nodes.get_mut(registration.id.as_str()) {
                Some(existing) => {
                    let was_online = existing.is_online();
                    existing.apply_registration(registration, now);

                    events.push(RegistryEvent::NodeReregistered {
                        node_id: existing.id.to_string(),
                    });
                    if !was_online {
                        events.push(RegistryEvent::NodeCameOnline {
                            node_id: existing.id.to_string(),
                        });
                    }
                    self.stats.reregistrations.fetch_add(1, Ordering::Relaxed);
                    existing.clone()
                }
                None => {
                    let node = Node::from_registration(registration, now);
                    events.push(RegistryEvent::NodeRegistered {
                        node_id: node.id.to_string(),
                        node_type: node.node_type.clone(),
                    });
                    self.stats.registrations.fetch_add(1, Ordering::Relaxed);
                    nodes.insert(node.id.clone(), node.clone());
                    node
                }
            }
        };

        self.publish(events);
        stored
    }

    /// Record a heartbeat. Returns `false` when the node has never registered,
    /// in which case nothing is changed.
    #[must_use]
    pub fn refresh(&self, node_id: &str) -> bool {
        let revived = {
            let mut nodes = self.nodes.write();
            let now = self.clock.now();

            nodes.get_mut(node_id).map(|node| {
                let was_online = node.is_online();
                node.touch(now);
                !was_online
            })
        };

        let Some(revived) = revived else {
            self.stats.refresh_misses.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        self.stats.refreshes.fetch_add(1, Ordering::Relaxed);
        if revived {
            self.publish(vec![RegistryEvent::NodeCameOnline {
                node_id: node_id.to_string(),
            }]);
        }
        true
    }

    /// Point-in-time copy of every record, in no particular order
    pub fn list(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    /// Get a node by ID
    pub fn get(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Check if a node exists
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.read().contains_key(node_id)
    }

    /// Number of records, online or not
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count nodes per status
    pub fn counts(&self) -> StatusCounts {
        let nodes = self.nodes.read();
        let mut counts = StatusCounts {
            total: nodes.len(),
            ..Default::default()
        };
        for node in nodes.values() {
            match node.status {
                NodeStatus::Online => counts.online += 1,
                NodeStatus::Offline => counts.offline += 1,
                NodeStatus::Degraded => counts.degraded += 1,
            }
        }
        counts
    }

    /// Get operation statistics
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Mark online nodes whose last heartbeat is strictly older than `timeout`
    /// as offline. Returns how many nodes changed state in this call.
    ///
    /// Offline nodes are never re-examined, so a second call right after the
    /// first returns 0.
    pub fn sweep_stale(&self, timeout: Duration) -> usize {
        let mut went_offline = Vec::new();

        {
            let mut nodes = self.nodes.write();
            let now = self.clock.now();

            for node in nodes.values_mut() {
                if node.status != NodeStatus::Online {
                    continue;
                }
                // A last_seen in the future (clock stepped back) has age zero
                let age = now
                    .signed_duration_since(node.last_seen)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if age > timeout {
                    node.status = NodeStatus::Offline;
                    went_offline.push(node.id.to_string());
                }
            }
        }

        let count = went_offline.len();
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stats.marked_offline.fetch_add(count as u64, Ordering::Relaxed);

        for node_id in &went_offline {
            debug!(node_id = %node_id, timeout_secs = timeout.as_secs(), "node missed liveness timeout");
        }
        self.publish(
            went_offline
                .into_iter()
                .map(|node_id| RegistryEvent::NodeWentOffline { node_id })
                .collect(),
        );

        count
    }

    fn publish(&self, events: Vec<RegistryEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.event_sender.send(event);
        }
    }
}
