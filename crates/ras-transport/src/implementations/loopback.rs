//! In-process federation transport.
//!
//! Providers running in the same process register their inbound handler on
//! a [`LoopbackHub`]; a [`LoopbackTransport`] then delivers outbound calls
//! straight to the target provider's handler. The hub can mark providers
//! unreachable to simulate a partition.

use crate::{
	RemoteRequestHandler, TransportError, TransportFactory, TransportInterface, TransportRegistry,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use once_cell::sync::Lazy;
use ras_types::{
	ConfigSchema, ImplementationRegistry, InstanceSnapshot, Order, OrderSignal, Schema,
};
use std::sync::{Arc, Weak};

static GLOBAL_HUB: Lazy<Arc<LoopbackHub>> = Lazy::new(|| Arc::new(LoopbackHub::new()));

/// Routing table of in-process providers.
///
/// Handlers are held weakly so a provider that shuts down simply becomes
/// unreachable.
#[derive(Default)]
pub struct LoopbackHub {
	peers: DashMap<String, Weak<dyn RemoteRequestHandler>>,
	unreachable: DashSet<String>,
}

impl LoopbackHub {
	pub fn new() -> Self {
		Self::default()
	}

	/// Process-wide hub used by the configuration factory.
	pub fn global() -> Arc<LoopbackHub> {
		GLOBAL_HUB.clone()
	}

	/// Registers the inbound handler of a provider, replacing any previous one.
	pub fn register(&self, provider: impl Into<String>, handler: &Arc<dyn RemoteRequestHandler>) {
		self.peers.insert(provider.into(), Arc::downgrade(handler));
	}

	pub fn unregister(&self, provider: &str) {
		self.peers.remove(provider);
	}

	/// Marks a provider reachable or unreachable.
	pub fn set_reachable(&self, provider: &str, reachable: bool) {
		if reachable {
			self.unreachable.remove(provider);
		} else {
			self.unreachable.insert(provider.to_string());
		}
	}

	fn route(&self, provider: &str) -> Result<Arc<dyn RemoteRequestHandler>, TransportError> {
		if self.unreachable.contains(provider) {
			return Err(TransportError::Communication(format!(
				"provider {} is unreachable",
				provider
			)));
		}
		self.peers
			.get(provider)
			.and_then(|peer| peer.upgrade())
			.ok_or_else(|| {
				TransportError::Communication(format!("no route to provider {}", provider))
			})
	}
}

/// Transport delivering calls through a [`LoopbackHub`].
pub struct LoopbackTransport {
	local_provider: String,
	hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
	pub fn new(local_provider: impl Into<String>, hub: Arc<LoopbackHub>) -> Self {
		Self {
			local_provider: local_provider.into(),
			hub,
		}
	}

	/// Routes to `provider` after checking both ends of the link are up.
	fn peer(&self, provider: &str) -> Result<Arc<dyn RemoteRequestHandler>, TransportError> {
		if self.hub.unreachable.contains(&self.local_provider) {
			return Err(TransportError::Communication(format!(
				"provider {} is partitioned",
				self.local_provider
			)));
		}
		self.hub.route(provider)
	}

	fn remote(provider: &str) -> impl Fn(crate::RemoteFailure) -> TransportError + '_ {
		move |failure| TransportError::Remote {
			provider: provider.to_string(),
			failure,
		}
	}
}

#[async_trait]
impl TransportInterface for LoopbackTransport {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(Schema::new(vec![], vec![]))
	}

	async fn create_remote_order(&self, order: &Order) -> Result<(), TransportError> {
		self.peer(&order.provider)?
			.handle_create_order(&self.local_provider, order.clone())
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn get_remote_order(&self, order: &Order) -> Result<Order, TransportError> {
		self.peer(&order.provider)?
			.handle_get_order(&self.local_provider, &order.id)
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn get_remote_instance(&self, order: &Order) -> Result<InstanceSnapshot, TransportError> {
		self.peer(&order.provider)?
			.handle_get_instance(&self.local_provider, &order.id)
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn delete_remote_order(&self, order: &Order) -> Result<(), TransportError> {
		self.peer(&order.provider)?
			.handle_delete_order(&self.local_provider, &order.id)
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn stop_remote_instance(&self, order: &Order) -> Result<(), TransportError> {
		self.peer(&order.provider)?
			.handle_stop_instance(&self.local_provider, &order.id)
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn resume_remote_instance(&self, order: &Order) -> Result<(), TransportError> {
		self.peer(&order.provider)?
			.handle_resume_instance(&self.local_provider, &order.id)
			.await
			.map_err(Self::remote(&order.provider))
	}

	async fn notify_requester(
		&self,
		order: &Order,
		signal: OrderSignal,
	) -> Result<(), TransportError> {
		self.peer(&order.requester)?
			.handle_event(&self.local_provider, order.clone(), signal)
			.await
			.map_err(Self::remote(&order.requester))
	}
}

/// Creates a loopback transport attached to the process-wide hub.
pub fn create_transport(
	local_provider: &str,
	config: &toml::Value,
) -> Result<Box<dyn TransportInterface>, TransportError> {
	Schema::new(vec![], vec![])
		.validate(config)
		.map_err(|e| TransportError::Configuration(e.to_string()))?;
	Ok(Box::new(LoopbackTransport::new(
		local_provider,
		LoopbackHub::global(),
	)))
}

/// Registry for the loopback transport.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "loopback";
	type Factory = TransportFactory;

	fn factory() -> Self::Factory {
		create_transport
	}
}

impl TransportRegistry for Registry {}
