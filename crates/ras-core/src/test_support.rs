//! Shared fixtures for unit tests.

use crate::connector::{CloudConnector, MockCloudConnector};
use crate::engine::event_bus::EventBus;
use crate::orders::{OrderRegistry, SharedOrder};
use crate::processors::ProcessorContext;
use crate::state::StateCoordinator;
use async_trait::async_trait;
use ras_storage::{implementations::memory::MemoryStorage, StorageService};
use ras_transport::{TransportError, TransportInterface, TransportService};
use ras_types::{ConfigSchema, InstanceSnapshot, Order, OrderSignal, OrderState, ResourceType};
use std::sync::Arc;

mockall::mock! {
	pub Transport {}

	#[async_trait]
	impl TransportInterface for Transport {
		fn config_schema(&self) -> Box<dyn ConfigSchema>;
		async fn create_remote_order(&self, order: &Order) -> Result<(), TransportError>;
		async fn get_remote_order(&self, order: &Order) -> Result<Order, TransportError>;
		async fn get_remote_instance(
			&self,
			order: &Order,
		) -> Result<InstanceSnapshot, TransportError>;
		async fn delete_remote_order(&self, order: &Order) -> Result<(), TransportError>;
		async fn stop_remote_instance(&self, order: &Order) -> Result<(), TransportError>;
		async fn resume_remote_instance(&self, order: &Order) -> Result<(), TransportError>;
		async fn notify_requester(
			&self,
			order: &Order,
			signal: OrderSignal,
		) -> Result<(), TransportError>;
	}
}

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

/// Processor context on an empty registry of provider "p1".
pub fn context(connector: MockCloudConnector, transport: MockTransport) -> ProcessorContext {
	let registry = Arc::new(OrderRegistry::new(memory_storage()));
	let coordinator = Arc::new(StateCoordinator::new(
		registry.clone(),
		Arc::new(TransportService::new(Box::new(transport))),
		"p1",
		EventBus::default(),
	));
	let connector: Arc<dyn CloudConnector> = Arc::new(connector);
	ProcessorContext {
		registry,
		coordinator,
		connector,
		local_provider: "p1".to_string(),
	}
}

/// Admits an order and walks it to `state`.
pub async fn order_in_state(
	ctx: &ProcessorContext,
	order: Order,
	state: OrderState,
) -> SharedOrder {
	let entry = ctx.registry.activate_order(order).await.unwrap();
	if state != OrderState::Open {
		ctx.coordinator.transition(&entry, state).await.unwrap();
	}
	entry
}

pub fn local_compute(id: &str) -> Order {
	let mut order = Order::new(ResourceType::Compute, "p1", "p1", "default").with_id(id);
	order.instance_id = Some(format!("i-{}", id));
	order
}

pub fn forwarded_compute(id: &str) -> Order {
	Order::new(ResourceType::Compute, "p1", "p2", "default").with_id(id)
}
