//! Node Records
//!
//! Identity and liveness state of a single edge device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Node Status
// =============================================================================

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Registered or refreshed within the liveness timeout
    Online,
    /// Timed out by a sweep
    Offline,
    /// Reserved for a future health signal; no registry operation sets it
    Degraded,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(NodeStatus::Online),
            "offline" => Ok(NodeStatus::Offline),
            "degraded" => Ok(NodeStatus::Degraded),
            other => Err(format!("unknown node status: {}", other)),
        }
    }
}

// =============================================================================
// Registration Candidate
// =============================================================================

/// Candidate record passed to [`NodeRegistry::register`](super::NodeRegistry::register)
///
/// The caller guarantees a non-empty `id`; the registry performs no validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRegistration {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
    pub capabilities: BTreeSet<String>,
    pub location: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl NodeRegistration {
    /// Create a candidate whose display name defaults to its ID
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            node_type: node_type.into(),
            capabilities: BTreeSet::new(),
            location: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Node
// =============================================================================

/// A registered edge device as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Node {
    /// Build a fresh online record from a registration
    pub(crate) fn from_registration(registration: NodeRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id: registration.id,
            name: registration.name,
            node_type: registration.node_type,
            capabilities: registration.capabilities,
            location: registration.location,
            last_seen: now,
            status: NodeStatus::Online,
            metadata: registration.metadata,
        }
    }

    /// Overwrite the mutable fields from a re-registration. The ID never changes.
    pub(crate) fn apply_registration(&mut self, registration: NodeRegistration, now: DateTime<Utc>) {
        self.name = registration.name;
        self.node_type = registration.node_type;
        self.capabilities = registration.capabilities;
        self.location = registration.location;
        self.metadata = registration.metadata;
        self.touch(now);
    }

    /// Mark the node online and advance `last_seen`, never moving it backwards
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.status = NodeStatus::Online;
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}
