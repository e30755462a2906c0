//! Common types for the federated resource allocation service.
//!
//! This crate defines the data model shared by every component: orders and
//! their lifecycle states, instance snapshots reported by cloud backends,
//! federation signals, and the configuration validation primitives used by
//! pluggable implementations.

/// Event types published on the engine event bus and exchanged between providers.
pub mod events;
/// Cloud instance snapshots reported by backends.
pub mod instance;
/// Order model and lifecycle states.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage namespaces for persisted data.
pub mod storage;
/// Utility helpers for display and timestamps.
pub mod utils;
/// Configuration validation types for pluggable implementations.
pub mod validation;

pub use events::*;
pub use instance::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
