//! Inbound federation requests.
//!
//! Two kinds of callers reach this facade. Requesters ask the owner to
//! create, inspect, stop, resume or delete orders forwarded to it. Owners
//! signal requesters about the orders they executed on their behalf. Each
//! call checks that the caller plays the right role for the order.

use super::{FacadeError, OrderFacade};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_transport::{RemoteFailure, RemoteRequestHandler};
use ras_types::{truncate_id, InstanceSnapshot, Order, OrderSignal, OrderState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::MutexGuard;
use tracing::instrument;

/// How long a signal waits for the mirror's lock before asking the owner
/// to retry.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

fn remote_failure(e: FacadeError) -> RemoteFailure {
	match e {
		FacadeError::OrderNotFound(id) => RemoteFailure::OrderNotFound(id),
		FacadeError::Cloud(CloudError::InstanceNotFound) => RemoteFailure::InstanceNotFound,
		FacadeError::InvalidState { .. }
		| FacadeError::HasDependents { .. }
		| FacadeError::InvalidOrder(_)
		| FacadeError::Cloud(CloudError::Unsupported(_)) => RemoteFailure::Rejected(e.to_string()),
		other => RemoteFailure::Backend(other.to_string()),
	}
}

/// Serves other providers.
pub struct FederationFacade {
	orders: Arc<OrderFacade>,
	lock_timeout: Duration,
}

impl FederationFacade {
	pub fn new(orders: Arc<OrderFacade>) -> Self {
		Self {
			orders,
			lock_timeout: DEFAULT_LOCK_TIMEOUT,
		}
	}

	pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
		self.lock_timeout = lock_timeout;
		self
	}

	fn local_provider(&self) -> &str {
		self.orders.local_provider()
	}

	/// Finds an order the caller forwarded to this provider.
	fn requested_by(&self, from: &str, order_id: &str) -> Result<SharedOrder, RemoteFailure> {
		let entry = self
			.orders
			.registry()
			.get(order_id)
			.ok_or_else(|| RemoteFailure::OrderNotFound(order_id.to_string()))?;
		if entry.requester() != from || entry.provider() != self.local_provider() {
			return Err(RemoteFailure::Rejected(format!(
				"{} did not request order {}",
				from, order_id
			)));
		}
		Ok(entry)
	}

	async fn lock_with_timeout<'a>(
		&self,
		entry: &'a SharedOrder,
	) -> Result<MutexGuard<'a, Order>, RemoteFailure> {
		tokio::time::timeout(self.lock_timeout, entry.lock())
			.await
			.map_err(|_| RemoteFailure::Busy(entry.id().to_string()))
	}
}

#[async_trait]
impl RemoteRequestHandler for FederationFacade {
	#[instrument(skip_all, fields(from = %from, order_id = %truncate_id(&order.id)))]
	async fn handle_create_order(&self, from: &str, order: Order) -> Result<(), RemoteFailure> {
		if order.requester != from || order.provider != self.local_provider() {
			return Err(RemoteFailure::Rejected(format!(
				"order {} is not from {} for {}",
				order.id,
				from,
				self.local_provider()
			)));
		}
		// A retried forward finds the order already admitted.
		if let Some(existing) = self.orders.registry().get(&order.id) {
			if existing.requester() == from {
				return Ok(());
			}
			return Err(RemoteFailure::Rejected(format!(
				"order {} already exists",
				order.id
			)));
		}

		let mut order = order;
		order.instance_id = None;
		order.fault_message = None;
		order.failed_on_request = false;
		self.orders
			.registry()
			.activate_order(order)
			.await
			.map_err(|e| remote_failure(e.into()))?;
		tracing::info!("Admitted forwarded order");
		Ok(())
	}

	async fn handle_get_order(&self, from: &str, order_id: &str) -> Result<Order, RemoteFailure> {
		let entry = self.requested_by(from, order_id)?;
		Ok(entry.snapshot().await)
	}

	async fn handle_get_instance(
		&self,
		from: &str,
		order_id: &str,
	) -> Result<InstanceSnapshot, RemoteFailure> {
		let entry = self.requested_by(from, order_id)?;
		let order = entry.lock().await;
		self.orders
			.connector()
			.get_instance(&order)
			.await
			.map_err(|e| remote_failure(e.into()))
	}

	/// Deletes the instance right away and leaves confirming the deletion to
	/// the DELETING processor, which closes the order and signals the caller.
	#[instrument(skip_all, fields(from = %from, order_id = %truncate_id(order_id)))]
	async fn handle_delete_order(&self, from: &str, order_id: &str) -> Result<(), RemoteFailure> {
		let entry = self.requested_by(from, order_id)?;
		let mut order = self.lock_with_timeout(&entry).await?;
		if order.state.is_deletion_in_progress() {
			return Ok(());
		}

		self.orders
			.connector()
			.delete_instance(&order)
			.await
			.map_err(|e| remote_failure(e.into()))?;
		self.orders
			.coordinator()
			.transition_locked(&entry, &mut order, OrderState::Deleting)
			.await
			.map_err(|e| remote_failure(e.into()))
	}

	async fn handle_stop_instance(&self, from: &str, order_id: &str) -> Result<(), RemoteFailure> {
		let entry = self.requested_by(from, order_id)?;
		self.orders.stop_entry(&entry).await.map_err(remote_failure)
	}

	async fn handle_resume_instance(
		&self,
		from: &str,
		order_id: &str,
	) -> Result<(), RemoteFailure> {
		let entry = self.requested_by(from, order_id)?;
		self.orders
			.resume_entry(&entry)
			.await
			.map_err(remote_failure)
	}

	/// Applies a signal from the owner to the local mirror.
	///
	/// The owner calls this while holding its own copy's lock, and this
	/// provider's sync processor may be calling the owner while holding the
	/// mirror's lock. Waiting for the mirror lock is therefore bounded; on
	/// timeout the owner is told to retry.
	#[instrument(
		skip_all,
		fields(from = %from, order_id = %truncate_id(&order.id), signal = %signal)
	)]
	async fn handle_event(
		&self,
		from: &str,
		order: Order,
		signal: OrderSignal,
	) -> Result<(), RemoteFailure> {
		let Some(entry) = self.orders.registry().get(&order.id) else {
			tracing::debug!("Ignoring signal for unknown order");
			return Ok(());
		};
		if entry.provider() != from {
			return Err(RemoteFailure::Rejected(format!(
				"{} does not own order {}",
				from, order.id
			)));
		}

		let mut mirror = self.lock_with_timeout(&entry).await?;
		if mirror.state == OrderState::Closed {
			return Ok(());
		}
		if order.instance_id.is_some() {
			mirror.instance_id = order.instance_id.clone();
		}
		if order.fault_message.is_some() {
			mirror.fault_message = order.fault_message.clone();
		}

		let coordinator = self.orders.coordinator();
		let target = signal.target_state();
		let result = if target == OrderState::Closed {
			coordinator.close_locked(&entry, &mut mirror).await
		} else if mirror.state == target || mirror.state == OrderState::AssignedForDeletion {
			// Already applied, or superseded by a local deletion.
			return Ok(());
		} else {
			coordinator
				.transition_locked(&entry, &mut mirror, target)
				.await
		};
		result.map_err(|e| remote_failure(e.into()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::engine::event_bus::EventBus;
	use crate::processors::ProcessorContext;
	use crate::test_support::{
		context, forwarded_compute, local_compute, order_in_state, MockTransport,
	};

	fn federation(ctx: &ProcessorContext) -> FederationFacade {
		FederationFacade::new(Arc::new(OrderFacade::new(
			ctx.registry.clone(),
			ctx.coordinator.clone(),
			ctx.connector.clone(),
			"p1",
			EventBus::default(),
		)))
		.with_lock_timeout(Duration::from_millis(20))
	}

	/// An order p2 forwarded to p1.
	fn inbound(id: &str) -> Order {
		let mut order = local_compute(id);
		order.requester = "p2".to_string();
		order
	}

	#[tokio::test]
	async fn test_create_checks_roles_and_is_idempotent() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let federation = federation(&ctx);

		federation.handle_create_order("p2", inbound("a")).await.unwrap();
		federation.handle_create_order("p2", inbound("a")).await.unwrap();
		assert_eq!(ctx.registry.len(), 1);
		let stored = ctx.registry.get("a").unwrap().snapshot().await;
		assert_eq!(stored.state, OrderState::Open);
		assert!(stored.instance_id.is_none());

		assert!(matches!(
			federation.handle_create_order("p3", inbound("b")).await,
			Err(RemoteFailure::Rejected(_))
		));
	}

	#[tokio::test]
	async fn test_only_the_requester_may_read() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let federation = federation(&ctx);
		federation.handle_create_order("p2", inbound("a")).await.unwrap();

		assert!(federation.handle_get_order("p2", "a").await.is_ok());
		assert!(matches!(
			federation.handle_get_order("p3", "a").await,
			Err(RemoteFailure::Rejected(_))
		));
		assert!(matches!(
			federation.handle_get_order("p2", "zzz").await,
			Err(RemoteFailure::OrderNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_delete_issues_deletion_and_moves_to_deleting() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_delete_instance()
			.times(1)
			.returning(|_| Ok(()));
		let ctx = context(connector, MockTransport::new());
		let federation = federation(&ctx);
		// SPAWNING needs no signal to the requester.
		let entry = order_in_state(&ctx, inbound("a"), OrderState::Spawning).await;

		federation.handle_delete_order("p2", "a").await.unwrap();
		federation.handle_delete_order("p2", "a").await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Deleting);
	}

	#[tokio::test]
	async fn test_event_moves_mirror() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let federation = federation(&ctx);
		let entry = order_in_state(&ctx, forwarded_compute("r"), OrderState::Pending).await;

		let mut remote = forwarded_compute("r");
		remote.instance_id = Some("i-remote".to_string());
		federation
			.handle_event("p2", remote.clone(), OrderSignal::Fulfilled)
			.await
			.unwrap();
		let mirror = entry.snapshot().await;
		assert_eq!(mirror.state, OrderState::Fulfilled);
		assert_eq!(mirror.instance_id.as_deref(), Some("i-remote"));

		// Duplicate delivery is harmless.
		federation
			.handle_event("p2", remote.clone(), OrderSignal::Fulfilled)
			.await
			.unwrap();

		assert!(matches!(
			federation
				.handle_event("p3", remote.clone(), OrderSignal::Closed)
				.await,
			Err(RemoteFailure::Rejected(_))
		));

		federation
			.handle_event("p2", remote, OrderSignal::Closed)
			.await
			.unwrap();
		assert!(!ctx.registry.contains("r"));
	}

	#[tokio::test]
	async fn test_event_on_locked_mirror_reports_busy() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let federation = federation(&ctx);
		let entry = order_in_state(&ctx, forwarded_compute("r"), OrderState::Pending).await;

		let _held = entry.lock().await;
		assert!(matches!(
			federation
				.handle_event("p2", forwarded_compute("r"), OrderSignal::Fulfilled)
				.await,
			Err(RemoteFailure::Busy(_))
		));
	}
}
