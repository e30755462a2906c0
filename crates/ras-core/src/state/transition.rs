//! State transition coordinator.
//!
//! The only component allowed to change an order's state. A transition
//! moves the order between two registry lists and updates its state field
//! as one step, while the caller holds the order's lock:
//!
//! 1. a remote requester is told about FULFILLED and failure states first,
//!    and the transition is abandoned if it cannot be told,
//! 2. the new value is persisted,
//! 3. the order leaves the origin list, takes the new state and joins the
//!    destination list with no suspension point in between.

use crate::engine::event_bus::EventBus;
use crate::orders::{OrderRegistry, RegistryError, SharedOrder};
use ras_storage::StorageError;
use ras_transport::{TransportError, TransportService};
use ras_types::{truncate_id, Order, OrderEvent, OrderId, OrderSignal, OrderState};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while moving an order between states.
#[derive(Debug, Error)]
pub enum TransitionError {
	#[error("Order {id} is already {state}")]
	SameState { id: OrderId, state: OrderState },
	#[error("No list for state {0}")]
	ListNotFound(OrderState),
	#[error("Order {id} is not a member of the {state} list")]
	NotInList { id: OrderId, state: OrderState },
	#[error("Failed to notify requester: {0}")]
	Notification(#[from] TransportError),
	#[error("Storage error: {0}")]
	Persistence(#[from] StorageError),
	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),
}

impl TransitionError {
	/// True when the registry and the order disagree, which retrying cannot fix.
	pub fn is_defect(&self) -> bool {
		match self {
			TransitionError::SameState { .. }
			| TransitionError::ListNotFound(_)
			| TransitionError::NotInList { .. } => true,
			TransitionError::Registry(e) => e.is_defect(),
			TransitionError::Notification(_) | TransitionError::Persistence(_) => false,
		}
	}
}

/// Moves orders between registry lists.
pub struct StateCoordinator {
	registry: Arc<OrderRegistry>,
	transport: Arc<TransportService>,
	local_provider: String,
	event_bus: EventBus,
}

impl StateCoordinator {
	pub fn new(
		registry: Arc<OrderRegistry>,
		transport: Arc<TransportService>,
		local_provider: impl Into<String>,
		event_bus: EventBus,
	) -> Self {
		Self {
			registry,
			transport,
			local_provider: local_provider.into(),
			event_bus,
		}
	}

	pub fn local_provider(&self) -> &str {
		&self.local_provider
	}

	/// Locks the order and moves it to `new_state`.
	pub async fn transition(
		&self,
		entry: &SharedOrder,
		new_state: OrderState,
	) -> Result<(), TransitionError> {
		let mut order = entry.lock().await;
		self.transition_locked(entry, &mut order, new_state).await
	}

	/// Moves an order the caller has already locked to `new_state`.
	///
	/// On error the order keeps its previous state and list membership.
	#[instrument(
		skip_all,
		fields(order_id = %truncate_id(entry.id()), from = %order.state, to = %new_state)
	)]
	pub async fn transition_locked(
		&self,
		entry: &SharedOrder,
		order: &mut Order,
		new_state: OrderState,
	) -> Result<(), TransitionError> {
		let from = order.state;
		if from == new_state {
			return Err(TransitionError::SameState {
				id: order.id.clone(),
				state: from,
			});
		}

		let origin = self
			.registry
			.list(from)
			.ok_or(TransitionError::ListNotFound(from))?;
		let destination = self
			.registry
			.list(new_state)
			.ok_or(TransitionError::ListNotFound(new_state))?;
		if !origin.contains(entry) {
			return Err(TransitionError::NotInList {
				id: order.id.clone(),
				state: from,
			});
		}

		let mut updated = order.clone();
		updated.state = new_state;
		updated.touch();

		if order.is_requester_remote(&self.local_provider) && new_state.requires_requester_signal()
		{
			if let Some(signal) = OrderSignal::for_state(new_state) {
				self.transport.notify_requester(&updated, signal).await?;
			}
		}

		self.registry.storage().save_order(&updated).await?;

		// Lists and field change together; no await until the move is done.
		if !origin.remove_item(entry) {
			return Err(TransitionError::NotInList {
				id: order.id.clone(),
				state: from,
			});
		}
		*order = updated;
		destination.add_item(entry.clone());

		tracing::info!("State changed");
		self.event_bus
			.publish(OrderEvent::StateChanged {
				order_id: order.id.clone(),
				from,
				to: new_state,
			})
			.ok();
		Ok(())
	}

	/// Closes a locked order.
	///
	/// A remote requester is told first. The order is persisted as CLOSED,
	/// removed from the registry and its list, and its dependents released.
	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id()), from = %order.state))]
	pub async fn close_locked(
		&self,
		entry: &SharedOrder,
		order: &mut Order,
	) -> Result<(), TransitionError> {
		let mut closed = order.clone();
		closed.state = OrderState::Closed;
		closed.touch();

		if order.is_requester_remote(&self.local_provider) {
			self.transport
				.notify_requester(&closed, OrderSignal::Closed)
				.await?;
		}

		self.registry.storage().save_order(&closed).await?;
		self.registry.deactivate_order(entry, order)?;
		*order = closed;

		tracing::info!("Order closed");
		self.event_bus
			.publish(OrderEvent::Closed {
				order_id: order.id.clone(),
			})
			.ok();
		Ok(())
	}

	/// Locks and closes an order.
	pub async fn close(&self, entry: &SharedOrder) -> Result<(), TransitionError> {
		let mut order = entry.lock().await;
		self.close_locked(entry, &mut order).await
	}

	/// Evicts an order that already sits in the CLOSED list.
	pub fn evict_closed(&self, entry: &SharedOrder, order: &Order) -> Result<(), TransitionError> {
		self.registry.deactivate_order(entry, order)?;
		tracing::debug!(order_id = %truncate_id(entry.id()), "Evicted closed order");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{memory_storage, MockTransport};
	use ras_types::ResourceType;

	struct Fixture {
		registry: Arc<OrderRegistry>,
		coordinator: StateCoordinator,
	}

	fn fixture(transport: MockTransport) -> Fixture {
		let registry = Arc::new(OrderRegistry::new(memory_storage()));
		let coordinator = StateCoordinator::new(
			registry.clone(),
			Arc::new(TransportService::new(Box::new(transport))),
			"p1",
			EventBus::default(),
		);
		Fixture {
			registry,
			coordinator,
		}
	}

	fn local_order(id: &str) -> Order {
		Order::new(ResourceType::Compute, "p1", "p1", "default").with_id(id)
	}

	fn members(registry: &OrderRegistry, state: OrderState) -> usize {
		registry.list(state).map(|list| list.len()).unwrap_or(0)
	}

	#[tokio::test]
	async fn test_transition_moves_between_lists_and_persists() {
		let f = fixture(MockTransport::new());
		let mut events = f.coordinator.event_bus.subscribe();
		let entry = f.registry.activate_order(local_order("a")).await.unwrap();

		f.coordinator
			.transition(&entry, OrderState::Spawning)
			.await
			.unwrap();

		assert_eq!(entry.snapshot().await.state, OrderState::Spawning);
		assert_eq!(members(&f.registry, OrderState::Open), 0);
		assert!(f.registry.list(OrderState::Spawning).unwrap().contains(&entry));
		let stored = f
			.registry
			.storage()
			.read_active_orders(OrderState::Spawning)
			.await
			.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(
			events.recv().await.unwrap(),
			OrderEvent::StateChanged {
				order_id: "a".to_string(),
				from: OrderState::Open,
				to: OrderState::Spawning,
			}
		);
	}

	#[tokio::test]
	async fn test_same_state_is_rejected_as_defect() {
		let f = fixture(MockTransport::new());
		let entry = f.registry.activate_order(local_order("a")).await.unwrap();
		let err = f
			.coordinator
			.transition(&entry, OrderState::Open)
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::SameState { .. }));
		assert!(err.is_defect());
	}

	#[tokio::test]
	async fn test_remote_requester_is_notified_before_move() {
		let mut transport = MockTransport::new();
		transport
			.expect_notify_requester()
			.withf(|order, signal| {
				order.state == OrderState::Fulfilled && *signal == OrderSignal::Fulfilled
			})
			.times(1)
			.returning(|_, _| Ok(()));
		let f = fixture(transport);

		let mut order = local_order("a");
		order.requester = "p2".to_string();
		let entry = f.registry.activate_order(order).await.unwrap();
		f.coordinator
			.transition(&entry, OrderState::Spawning)
			.await
			.unwrap();
		f.coordinator
			.transition(&entry, OrderState::Fulfilled)
			.await
			.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Fulfilled);
	}

	#[tokio::test]
	async fn test_failed_notification_leaves_order_untouched() {
		let mut transport = MockTransport::new();
		transport
			.expect_notify_requester()
			.times(1)
			.returning(|_, _| Err(TransportError::Communication("unreachable".to_string())));
		let f = fixture(transport);

		let mut order = local_order("a");
		order.requester = "p2".to_string();
		let entry = f.registry.activate_order(order).await.unwrap();
		f.coordinator
			.transition(&entry, OrderState::Spawning)
			.await
			.unwrap();

		let err = f
			.coordinator
			.transition(&entry, OrderState::FailedAfterSuccessfulRequest)
			.await
			.unwrap_err();
		assert!(matches!(err, TransitionError::Notification(_)));
		assert!(!err.is_defect());

		assert_eq!(entry.snapshot().await.state, OrderState::Spawning);
		assert!(f.registry.list(OrderState::Spawning).unwrap().contains(&entry));
		assert_eq!(members(&f.registry, OrderState::FailedAfterSuccessfulRequest), 0);
		let stored = f
			.registry
			.storage()
			.read_active_orders(OrderState::Spawning)
			.await
			.unwrap();
		assert_eq!(stored.len(), 1);
	}

	#[tokio::test]
	async fn test_close_removes_order_and_releases_dependents() {
		let f = fixture(MockTransport::new());
		let volume = f.registry.activate_order(local_order("vol")).await.unwrap();
		let attachment = f
			.registry
			.activate_order(local_order("att").with_dependencies(vec!["vol".to_string()]))
			.await
			.unwrap();
		assert!(f.registry.dependencies().has_dependents("vol"));

		f.coordinator.close(&attachment).await.unwrap();

		assert!(!f.registry.contains("att"));
		assert!(f.registry.contains(volume.id()));
		assert!(!f.registry.dependencies().has_dependents("vol"));
		assert_eq!(attachment.snapshot().await.state, OrderState::Closed);
		assert_eq!(members(&f.registry, OrderState::Open), 1);
		assert!(matches!(
			f.coordinator.close(&attachment).await,
			Err(TransitionError::Registry(RegistryError::NotActive(_)))
		));
	}

	#[tokio::test]
	async fn test_concurrent_transitions_keep_single_membership() {
		let f = fixture(MockTransport::new());
		let coordinator = Arc::new(f.coordinator);
		let mut entries = Vec::new();
		for i in 0..20 {
			entries.push(
				f.registry
					.activate_order(local_order(&format!("o{}", i)))
					.await
					.unwrap(),
			);
		}

		let mut handles = Vec::new();
		for entry in entries.clone() {
			let coordinator = coordinator.clone();
			handles.push(tokio::spawn(async move {
				for state in [
					OrderState::Spawning,
					OrderState::Fulfilled,
					OrderState::AssignedForDeletion,
				] {
					coordinator.transition(&entry, state).await.unwrap();
				}
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let membership = f.registry.membership();
		assert_eq!(membership.len(), 1);
		assert_eq!(membership[&OrderState::AssignedForDeletion].len(), 20);
		for entry in entries {
			assert_eq!(entry.snapshot().await.state, OrderState::AssignedForDeletion);
		}
	}
}
