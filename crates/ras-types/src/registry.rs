//! Registry trait for self-registering implementations.
//!
//! Storage backends, cloud plugins and transports each expose a `Registry`
//! struct implementing this trait so the service can build a name to factory
//! map without reflection.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// For example "memory" for `storage.implementations.memory` or
	/// "simulated" for `implementation = "simulated"` under a cloud table.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
