//! Shared handle to an active order.

use ras_types::{Order, OrderId, ResourceType};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// An active order and the lock serializing every change to it.
///
/// The identity fields are copied out of the order at construction. They
/// never change, so they can be read without taking the lock.
#[derive(Debug)]
pub struct OrderEntry {
	id: OrderId,
	requester: String,
	provider: String,
	resource_type: ResourceType,
	order: Mutex<Order>,
}

/// Handle shared between the registry, its state lists and the processors.
pub type SharedOrder = Arc<OrderEntry>;

impl OrderEntry {
	pub fn new(order: Order) -> SharedOrder {
		Arc::new(Self {
			id: order.id.clone(),
			requester: order.requester.clone(),
			provider: order.provider.clone(),
			resource_type: order.resource_type,
			order: Mutex::new(order),
		})
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn requester(&self) -> &str {
		&self.requester
	}

	pub fn provider(&self) -> &str {
		&self.provider
	}

	pub fn resource_type(&self) -> ResourceType {
		self.resource_type
	}

	pub fn is_provider_remote(&self, local_provider: &str) -> bool {
		self.provider != local_provider
	}

	/// Acquires the order's lock.
	pub async fn lock(&self) -> MutexGuard<'_, Order> {
		self.order.lock().await
	}

	/// Returns a copy of the order's current value.
	pub async fn snapshot(&self) -> Order {
		self.order.lock().await.clone()
	}
}
