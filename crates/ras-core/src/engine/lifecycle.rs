//! Startup and shutdown of the engine.

use super::{EngineError, RasEngine};
use crate::recovery::{RecoveryReport, RecoveryService};

impl RasEngine {
	/// Reports the orders restored from storage before the fleet starts.
	pub async fn initialize(&self) -> Result<RecoveryReport, EngineError> {
		tracing::info!(provider = %self.provider_id(), "Initializing engine");
		Ok(RecoveryService::new(self.registry.clone()).report())
	}

	/// Stops every processor, letting in-flight order work finish.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!(provider = %self.provider_id(), "Shutting down engine");
		self.fleet.stop().await;
		Ok(())
	}
}
