//! Resource allocation engine.
//!
//! Holds the registry, the coordinator, the facades and the processor
//! fleet of one provider, and runs the fleet until asked to stop.

pub mod event_bus;
mod fleet;
mod lifecycle;

pub use fleet::ProcessorFleet;

use crate::facade::{FederationFacade, OrderFacade};
use crate::orders::OrderRegistry;
use crate::state::StateCoordinator;
use ras_config::Config;
use ras_transport::RemoteRequestHandler;
use ras_types::{truncate_id, OrderEvent};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Everything one provider runs.
#[derive(Clone)]
pub struct RasEngine {
	pub(crate) config: Config,
	pub(crate) registry: Arc<OrderRegistry>,
	pub(crate) coordinator: Arc<StateCoordinator>,
	pub(crate) facade: Arc<OrderFacade>,
	pub(crate) federation: Arc<FederationFacade>,
	pub(crate) fleet: Arc<ProcessorFleet>,
	pub(crate) event_bus: event_bus::EventBus,
}

impl RasEngine {
	/// Runs until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Runs until `shutdown` completes, then stops every processor.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		self.initialize().await?;
		if !self.fleet.start() {
			return Err(EngineError::Service("Engine is already running".to_string()));
		}

		let mut events = self.event_bus.subscribe();
		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(event) => Self::log_event(&event),
					Err(RecvError::Lagged(skipped)) => {
						tracing::debug!(skipped, "Event log fell behind");
					},
					Err(RecvError::Closed) => break,
				},
				_ = &mut shutdown => break,
			}
		}

		self.shutdown().await
	}

	fn log_event(event: &OrderEvent) {
		match event {
			OrderEvent::Activated { order_id } => {
				tracing::debug!(order_id = %truncate_id(order_id), "Order activated")
			},
			OrderEvent::StateChanged { order_id, from, to } => tracing::debug!(
				order_id = %truncate_id(order_id),
				from = %from,
				to = %to,
				"Order changed state"
			),
			OrderEvent::Closed { order_id } => {
				tracing::debug!(order_id = %truncate_id(order_id), "Order closed")
			},
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn provider_id(&self) -> &str {
		&self.config.provider.id
	}

	pub fn registry(&self) -> &Arc<OrderRegistry> {
		&self.registry
	}

	pub fn coordinator(&self) -> &Arc<StateCoordinator> {
		&self.coordinator
	}

	/// Order operations for local users.
	pub fn orders(&self) -> &Arc<OrderFacade> {
		&self.facade
	}

	/// Handler for requests from other providers, to be attached to the
	/// transport. Transports hold it weakly, so it stays alive only as long
	/// as the engine does.
	pub fn federation(&self) -> Arc<dyn RemoteRequestHandler> {
		self.federation.clone()
	}

	pub fn fleet(&self) -> &Arc<ProcessorFleet> {
		&self.fleet
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}
}
