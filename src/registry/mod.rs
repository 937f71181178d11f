//! Node Registry Module
//!
//! In-memory registry of edge nodes and their liveness state, plus the
//! events it emits as nodes come and go.

pub mod clock;
pub mod events;
pub mod node;
pub mod node_registry;

pub use clock::*;
pub use events::*;
pub use node::*;
pub use node_registry::*;
