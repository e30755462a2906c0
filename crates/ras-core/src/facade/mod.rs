//! Entry points for order requests.
//!
//! [`OrderFacade`] serves this provider's own users. [`FederationFacade`]
//! serves requests arriving from other providers over the transport.

mod federation;

pub use federation::FederationFacade;

use crate::connector::CloudConnector;
use crate::engine::event_bus::EventBus;
use crate::orders::{OrderRegistry, RegistryError, SharedOrder};
use crate::state::{StateCoordinator, TransitionError};
use ras_cloud::CloudError;
use ras_types::{
	truncate_id, InstanceSnapshot, Order, OrderEvent, OrderId, OrderState, ResourceType,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors returned to callers of the facades.
#[derive(Debug, Error)]
pub enum FacadeError {
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Cannot {operation} order {id} in state {state}")]
	InvalidState {
		id: OrderId,
		state: OrderState,
		operation: &'static str,
	},
	#[error("Order {id} still has dependents: {dependents:?}")]
	HasDependents {
		id: OrderId,
		dependents: Vec<OrderId>,
	},
	#[error("Invalid order: {0}")]
	InvalidOrder(String),
	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),
	#[error("Transition error: {0}")]
	Transition(#[from] TransitionError),
	#[error("Cloud error: {0}")]
	Cloud(#[from] CloudError),
}

/// Order operations for local users.
pub struct OrderFacade {
	registry: Arc<OrderRegistry>,
	coordinator: Arc<StateCoordinator>,
	connector: Arc<dyn CloudConnector>,
	local_provider: String,
	event_bus: EventBus,
}

impl OrderFacade {
	pub fn new(
		registry: Arc<OrderRegistry>,
		coordinator: Arc<StateCoordinator>,
		connector: Arc<dyn CloudConnector>,
		local_provider: impl Into<String>,
		event_bus: EventBus,
	) -> Self {
		Self {
			registry,
			coordinator,
			connector,
			local_provider: local_provider.into(),
			event_bus,
		}
	}

	pub fn local_provider(&self) -> &str {
		&self.local_provider
	}

	pub(crate) fn registry(&self) -> &Arc<OrderRegistry> {
		&self.registry
	}

	pub(crate) fn coordinator(&self) -> &Arc<StateCoordinator> {
		&self.coordinator
	}

	pub(crate) fn connector(&self) -> &Arc<dyn CloudConnector> {
		&self.connector
	}

	fn lookup(&self, order_id: &str) -> Result<SharedOrder, FacadeError> {
		self.registry
			.get(order_id)
			.ok_or_else(|| FacadeError::OrderNotFound(order_id.to_string()))
	}

	/// Admits an order submitted by a local user.
	///
	/// An empty provider means this provider. Every dependency must be an
	/// active order.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn activate_order(&self, mut order: Order) -> Result<SharedOrder, FacadeError> {
		if order.provider.is_empty() {
			order.provider = self.local_provider.clone();
		}
		if order.requester != self.local_provider {
			return Err(FacadeError::InvalidOrder(format!(
				"requester {} is not this provider",
				order.requester
			)));
		}
		if let Some(missing) = order
			.dependencies
			.iter()
			.find(|dependency| !self.registry.contains(dependency))
		{
			return Err(FacadeError::InvalidOrder(format!(
				"dependency {} is not active",
				missing
			)));
		}

		let entry = self.registry.activate_order(order).await?;
		self.event_bus
			.publish(OrderEvent::Activated {
				order_id: entry.id().to_string(),
			})
			.ok();
		Ok(entry)
	}

	/// Returns a copy of an active order.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, FacadeError> {
		Ok(self.lookup(order_id)?.snapshot().await)
	}

	/// Reads the instance backing an active order.
	pub async fn get_instance(&self, order_id: &str) -> Result<InstanceSnapshot, FacadeError> {
		let entry = self.lookup(order_id)?;
		let order = entry.lock().await;
		Ok(self.connector.get_instance(&order).await?)
	}

	/// Starts deleting an order.
	///
	/// Local orders are handed to the deletion processors. Forwarded orders
	/// are deleted at the owner first; the owner's CLOSED signal closes the
	/// mirror. A forwarded order the owner never accepted is closed at once.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn delete_order(&self, order_id: &str) -> Result<(), FacadeError> {
		let entry = self.lookup(order_id)?;
		let mut order = entry.lock().await;

		if order.state.is_deletion_in_progress() || order.state == OrderState::Closed {
			return Err(FacadeError::InvalidState {
				id: order.id.clone(),
				state: order.state,
				operation: "delete",
			});
		}
		let dependents = self.registry.dependencies().dependents(&order.id);
		if !dependents.is_empty() {
			return Err(FacadeError::HasDependents {
				id: order.id.clone(),
				dependents,
			});
		}
		if order.state == OrderState::Selected {
			tracing::warn!("Deleting an order whose resource request may be in flight");
		}

		if order.is_provider_remote(&self.local_provider) {
			let never_accepted = order.failed_on_request
				|| matches!(order.state, OrderState::Open | OrderState::FailedOnRequest);
			if never_accepted {
				self.coordinator.close_locked(&entry, &mut order).await?;
				return Ok(());
			}
			match self.connector.delete_instance(&order).await {
				Ok(()) => {},
				Err(CloudError::InstanceNotFound) => {
					self.coordinator.close_locked(&entry, &mut order).await?;
					return Ok(());
				},
				Err(e) => return Err(e.into()),
			}
		}

		self.coordinator
			.transition_locked(&entry, &mut order, OrderState::AssignedForDeletion)
			.await?;
		Ok(())
	}

	/// Stops the compute instance of a FULFILLED order.
	pub async fn stop_order(&self, order_id: &str) -> Result<(), FacadeError> {
		let entry = self.lookup(order_id)?;
		self.stop_entry(&entry).await
	}

	pub(crate) async fn stop_entry(&self, entry: &SharedOrder) -> Result<(), FacadeError> {
		let mut order = entry.lock().await;
		Self::require(&order, OrderState::Fulfilled, "stop")?;
		self.connector.stop_instance(&order).await?;
		self.coordinator
			.transition_locked(entry, &mut order, OrderState::Stopping)
			.await?;
		Ok(())
	}

	/// Resumes the compute instance of a STOPPED order.
	pub async fn resume_order(&self, order_id: &str) -> Result<(), FacadeError> {
		let entry = self.lookup(order_id)?;
		self.resume_entry(&entry).await
	}

	pub(crate) async fn resume_entry(&self, entry: &SharedOrder) -> Result<(), FacadeError> {
		let mut order = entry.lock().await;
		Self::require(&order, OrderState::Stopped, "resume")?;
		self.connector.resume_instance(&order).await?;
		self.coordinator
			.transition_locked(entry, &mut order, OrderState::Resuming)
			.await?;
		Ok(())
	}

	/// Closes an order without touching its resource.
	pub async fn close_order(&self, order_id: &str) -> Result<(), FacadeError> {
		let entry = self.lookup(order_id)?;
		self.coordinator.close(&entry).await?;
		Ok(())
	}

	fn require(
		order: &Order,
		state: OrderState,
		operation: &'static str,
	) -> Result<(), FacadeError> {
		if order.resource_type != ResourceType::Compute || order.state != state {
			return Err(FacadeError::InvalidState {
				id: order.id.clone(),
				state: order.state,
				operation,
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::test_support::{
		context, forwarded_compute, local_compute, order_in_state, MockTransport,
	};
	use crate::processors::ProcessorContext;

	fn facade(ctx: &ProcessorContext) -> OrderFacade {
		OrderFacade::new(
			ctx.registry.clone(),
			ctx.coordinator.clone(),
			ctx.connector.clone(),
			"p1",
			EventBus::default(),
		)
	}

	#[tokio::test]
	async fn test_activate_validates_requester_and_dependencies() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let facade = facade(&ctx);

		let mut foreign = local_compute("x");
		foreign.requester = "p9".to_string();
		assert!(matches!(
			facade.activate_order(foreign).await,
			Err(FacadeError::InvalidOrder(_))
		));

		let dangling = local_compute("y").with_dependencies(vec!["missing".to_string()]);
		assert!(matches!(
			facade.activate_order(dangling).await,
			Err(FacadeError::InvalidOrder(_))
		));

		let mut implicit = local_compute("z");
		implicit.provider = String::new();
		let entry = facade.activate_order(implicit).await.unwrap();
		assert_eq!(entry.provider(), "p1");
		assert_eq!(facade.get_order("z").await.unwrap().state, OrderState::Open);
	}

	#[tokio::test]
	async fn test_delete_rules() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let facade = facade(&ctx);
		let volume = order_in_state(&ctx, local_compute("vol"), OrderState::Fulfilled).await;
		order_in_state(
			&ctx,
			local_compute("att").with_dependencies(vec!["vol".to_string()]),
			OrderState::Fulfilled,
		)
		.await;

		assert!(matches!(
			facade.delete_order("vol").await,
			Err(FacadeError::HasDependents { .. })
		));
		facade.delete_order("att").await.unwrap();
		assert!(matches!(
			facade.delete_order("att").await,
			Err(FacadeError::InvalidState { .. })
		));
		assert!(matches!(
			facade.delete_order("nope").await,
			Err(FacadeError::OrderNotFound(_))
		));
		assert_eq!(volume.snapshot().await.state, OrderState::Fulfilled);
	}

	#[tokio::test]
	async fn test_delete_forwarded_order() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_delete_instance()
			.withf(|order| order.id == "accepted")
			.times(1)
			.returning(|_| Ok(()));
		let ctx = context(connector, MockTransport::new());
		let facade = facade(&ctx);
		let accepted =
			order_in_state(&ctx, forwarded_compute("accepted"), OrderState::Fulfilled).await;
		order_in_state(&ctx, forwarded_compute("unsent"), OrderState::Open).await;

		facade.delete_order("accepted").await.unwrap();
		assert_eq!(
			accepted.snapshot().await.state,
			OrderState::AssignedForDeletion
		);

		facade.delete_order("unsent").await.unwrap();
		assert!(!ctx.registry.contains("unsent"));
	}

	#[tokio::test]
	async fn test_stop_and_resume_require_compute_state() {
		let mut connector = MockCloudConnector::new();
		connector.expect_stop_instance().times(1).returning(|_| Ok(()));
		connector.expect_resume_instance().times(1).returning(|_| Ok(()));
		let ctx = context(connector, MockTransport::new());
		let facade = facade(&ctx);
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Fulfilled).await;

		assert!(matches!(
			facade.resume_order("a").await,
			Err(FacadeError::InvalidState { .. })
		));
		facade.stop_order("a").await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Stopping);

		ctx.coordinator
			.transition(&entry, OrderState::Stopped)
			.await
			.unwrap();
		facade.resume_order("a").await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Resuming);
	}
}
