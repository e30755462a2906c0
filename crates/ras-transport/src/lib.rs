//! Inter-provider transport.
//!
//! Providers in a federation talk to each other to forward orders they do
//! not own, to read back the state of forwarded orders, and to tell a remote
//! requester what happened to an order executed on its behalf. This crate
//! defines both directions of that conversation:
//!
//! - [`TransportInterface`]: outbound calls made by this provider.
//! - [`RemoteRequestHandler`]: inbound calls served by this provider.
//!
//! The wire encoding belongs to each transport implementation.

use async_trait::async_trait;
use ras_types::{
	ConfigSchema, ImplementationRegistry, InstanceSnapshot, Order, OrderId, OrderSignal,
};
use thiserror::Error;

pub mod implementations {
	pub mod loopback;
}

/// Failure reported by the remote provider that served a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteFailure {
	#[error("instance not found")]
	InstanceNotFound,
	#[error("order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("backend error: {0}")]
	Backend(String),
	#[error("request rejected: {0}")]
	Rejected(String),
	#[error("order busy: {0}")]
	Busy(OrderId),
}

/// Errors surfaced by transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
	/// The remote provider could not be reached.
	#[error("Communication error: {0}")]
	Communication(String),
	/// The remote provider answered with a failure.
	#[error("Remote provider {provider} failed: {failure}")]
	Remote {
		provider: String,
		failure: RemoteFailure,
	},
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl TransportError {
	pub fn is_communication(&self) -> bool {
		matches!(self, TransportError::Communication(_))
	}
}

/// Outbound calls to other providers.
///
/// Requests about an order are routed to `order.provider`; notifications are
/// routed to `order.requester`.
#[async_trait]
pub trait TransportInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Asks the owning provider to admit and serve the order.
	async fn create_remote_order(&self, order: &Order) -> Result<(), TransportError>;

	/// Reads the owning provider's copy of the order.
	async fn get_remote_order(&self, order: &Order) -> Result<Order, TransportError>;

	/// Reads the instance backing the order at the owning provider.
	async fn get_remote_instance(&self, order: &Order) -> Result<InstanceSnapshot, TransportError>;

	/// Asks the owning provider to delete the order's instance.
	async fn delete_remote_order(&self, order: &Order) -> Result<(), TransportError>;

	async fn stop_remote_instance(&self, order: &Order) -> Result<(), TransportError>;

	async fn resume_remote_instance(&self, order: &Order) -> Result<(), TransportError>;

	/// Tells the requesting provider about the order.
	async fn notify_requester(
		&self,
		order: &Order,
		signal: OrderSignal,
	) -> Result<(), TransportError>;
}

/// Inbound requests from other providers.
///
/// `from` is the identifier of the calling provider.
#[async_trait]
pub trait RemoteRequestHandler: Send + Sync {
	async fn handle_create_order(&self, from: &str, order: Order) -> Result<(), RemoteFailure>;

	async fn handle_get_order(&self, from: &str, order_id: &str) -> Result<Order, RemoteFailure>;

	async fn handle_get_instance(
		&self,
		from: &str,
		order_id: &str,
	) -> Result<InstanceSnapshot, RemoteFailure>;

	async fn handle_delete_order(&self, from: &str, order_id: &str) -> Result<(), RemoteFailure>;

	async fn handle_stop_instance(&self, from: &str, order_id: &str) -> Result<(), RemoteFailure>;

	async fn handle_resume_instance(&self, from: &str, order_id: &str)
		-> Result<(), RemoteFailure>;

	/// Receives a notification from the provider that owns the order.
	async fn handle_event(
		&self,
		from: &str,
		order: Order,
		signal: OrderSignal,
	) -> Result<(), RemoteFailure>;
}

/// Factory signature every transport provides.
///
/// Receives this provider's identifier and the implementation's settings.
pub type TransportFactory =
	fn(&str, &toml::Value) -> Result<Box<dyn TransportInterface>, TransportError>;

/// Registry trait for transport implementations.
pub trait TransportRegistry: ImplementationRegistry<Factory = TransportFactory> {}

/// Returns every registered transport as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, TransportFactory)> {
	use implementations::loopback;

	vec![(loopback::Registry::NAME, loopback::Registry::factory())]
}

/// Outbound transport used by the orchestration core.
pub struct TransportService {
	backend: Box<dyn TransportInterface>,
}

impl TransportService {
	pub fn new(backend: Box<dyn TransportInterface>) -> Self {
		Self { backend }
	}

	pub async fn create_remote_order(&self, order: &Order) -> Result<(), TransportError> {
		tracing::debug!(
			provider = %order.provider,
			order_id = %ras_types::truncate_id(&order.id),
			"Forwarding order"
		);
		self.backend.create_remote_order(order).await
	}

	pub async fn get_remote_order(&self, order: &Order) -> Result<Order, TransportError> {
		self.backend.get_remote_order(order).await
	}

	pub async fn get_remote_instance(
		&self,
		order: &Order,
	) -> Result<InstanceSnapshot, TransportError> {
		self.backend.get_remote_instance(order).await
	}

	pub async fn delete_remote_order(&self, order: &Order) -> Result<(), TransportError> {
		self.backend.delete_remote_order(order).await
	}

	pub async fn stop_remote_instance(&self, order: &Order) -> Result<(), TransportError> {
		self.backend.stop_remote_instance(order).await
	}

	pub async fn resume_remote_instance(&self, order: &Order) -> Result<(), TransportError> {
		self.backend.resume_remote_instance(order).await
	}

	pub async fn notify_requester(
		&self,
		order: &Order,
		signal: OrderSignal,
	) -> Result<(), TransportError> {
		tracing::debug!(
			requester = %order.requester,
			order_id = %ras_types::truncate_id(&order.id),
			signal = %signal,
			"Notifying requester"
		);
		self.backend.notify_requester(order, signal).await
	}
}
