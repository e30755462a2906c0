//! Core of the resource allocation service.
//!
//! Orders live in a registry partitioned by state. A fleet of processors,
//! one per state, drives each order through its lifecycle by calling the
//! cloud connector, which reaches either a local cloud plugin or the
//! provider that owns the order. Every state change goes through the
//! state coordinator so that persistence, remote notification and list
//! membership stay consistent.

pub mod builder;
pub mod connector;
pub mod engine;
pub mod facade;
pub mod orders;
pub mod processors;
pub mod recovery;
pub mod state;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, RasBuilder, RasFactories};
pub use engine::{EngineError, RasEngine};
pub use facade::{FacadeError, FederationFacade, OrderFacade};
