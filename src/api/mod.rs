//! API Module
//!
//! REST transport for node registration, heartbeats and fleet queries.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
