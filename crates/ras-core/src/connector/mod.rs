//! Cloud connectors.
//!
//! Processors and facades reach the cloud through [`CloudConnector`]. The
//! [`ConnectorDispatch`] picks the local connector for orders this provider
//! owns and the remote connector for orders it forwarded elsewhere.

mod local;
mod remote;

pub use local::LocalConnector;
pub use remote::RemoteConnector;

use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{InstanceSnapshot, Order};

/// Operations on the cloud resource backing an order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudConnector: Send + Sync {
	/// Requests the resource.
	///
	/// Returns the instance id when it is known immediately, which is only
	/// the case for local provisioning.
	async fn request_instance(&self, order: &Order) -> Result<Option<String>, CloudError>;

	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError>;

	/// Deletes the resource. Deleting a resource that is already gone succeeds.
	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError>;

	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError>;

	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError>;
}

/// Routes each call on the order's owning provider.
pub struct ConnectorDispatch {
	local_provider: String,
	local: LocalConnector,
	remote: RemoteConnector,
}

impl ConnectorDispatch {
	pub fn new(
		local_provider: impl Into<String>,
		local: LocalConnector,
		remote: RemoteConnector,
	) -> Self {
		Self {
			local_provider: local_provider.into(),
			local,
			remote,
		}
	}

	fn route(&self, order: &Order) -> &dyn CloudConnector {
		if order.is_provider_local(&self.local_provider) {
			&self.local
		} else {
			&self.remote
		}
	}
}

#[async_trait]
impl CloudConnector for ConnectorDispatch {
	async fn request_instance(&self, order: &Order) -> Result<Option<String>, CloudError> {
		self.route(order).request_instance(order).await
	}

	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError> {
		self.route(order).get_instance(order).await
	}

	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.route(order).delete_instance(order).await
	}

	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.route(order).stop_instance(order).await
	}

	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.route(order).resume_instance(order).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::MockTransport;
	use ras_cloud::{implementations::simulated::SimulatedCloud, CloudService};
	use ras_transport::{RemoteFailure, TransportError, TransportService};
	use ras_types::{InstanceState, ResourceType};
	use std::sync::Arc;

	fn dispatch(transport: MockTransport) -> ConnectorDispatch {
		let mut cloud = CloudService::new("default");
		cloud.register(
			ResourceType::Compute,
			"default",
			Arc::new(SimulatedCloud::new(0, false)),
		);
		ConnectorDispatch::new(
			"p1",
			LocalConnector::new(Arc::new(cloud)),
			RemoteConnector::new(Arc::new(TransportService::new(Box::new(transport)))),
		)
	}

	#[tokio::test]
	async fn test_local_orders_use_the_cloud_plugin() {
		let dispatch = dispatch(MockTransport::new());
		let mut order = Order::new(ResourceType::Compute, "p1", "p1", "default");

		let instance_id = dispatch.request_instance(&order).await.unwrap();
		assert!(instance_id.is_some());
		order.instance_id = instance_id;
		assert_eq!(
			dispatch.get_instance(&order).await.unwrap().state,
			InstanceState::Ready
		);
	}

	#[tokio::test]
	async fn test_remote_orders_use_the_transport() {
		let mut transport = MockTransport::new();
		transport
			.expect_create_remote_order()
			.times(1)
			.returning(|_| Ok(()));
		transport.expect_get_remote_instance().returning(|_| {
			Err(TransportError::Remote {
				provider: "p2".to_string(),
				failure: RemoteFailure::InstanceNotFound,
			})
		});
		let dispatch = dispatch(transport);
		let order = Order::new(ResourceType::Compute, "p1", "p2", "default");

		assert_eq!(dispatch.request_instance(&order).await, Ok(None));
		assert_eq!(
			dispatch.get_instance(&order).await,
			Err(CloudError::InstanceNotFound)
		);
	}
}
