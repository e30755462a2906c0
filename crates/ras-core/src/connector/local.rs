//! Connector for orders this provider owns.

use super::CloudConnector;
use async_trait::async_trait;
use ras_cloud::{CloudError, CloudService};
use ras_types::{truncate_id, InstanceSnapshot, Order, OrderState};
use std::sync::Arc;

/// Calls the cloud plugin serving the order and records an audit trail of
/// every resource-changing call.
pub struct LocalConnector {
	cloud: Arc<CloudService>,
}

impl LocalConnector {
	pub fn new(cloud: Arc<CloudService>) -> Self {
		Self { cloud }
	}

	/// Records a resource-changing call. `instance_id` is the instance the
	/// call acted on, or the one it created.
	fn audit(
		order: &Order,
		operation: &str,
		instance_id: Option<&str>,
		outcome: Result<(), &CloudError>,
	) {
		let instance_id = instance_id.unwrap_or("-");
		match outcome {
			Ok(()) => tracing::info!(
				target: "ras::audit",
				order_id = %truncate_id(&order.id),
				requester = %order.requester,
				resource_type = %order.resource_type,
				instance_id,
				operation,
				"Succeeded"
			),
			Err(e) => tracing::warn!(
				target: "ras::audit",
				order_id = %truncate_id(&order.id),
				requester = %order.requester,
				resource_type = %order.resource_type,
				instance_id,
				operation,
				error = %e,
				"Failed"
			),
		}
	}
}

#[async_trait]
impl CloudConnector for LocalConnector {
	async fn request_instance(&self, order: &Order) -> Result<Option<String>, CloudError> {
		let result = self.cloud.plugin_for(order)?.request_instance(order).await;
		match &result {
			Ok(instance_id) => Self::audit(order, "request", Some(instance_id.as_str()), Ok(())),
			Err(e) => Self::audit(order, "request", None, Err(e)),
		}
		result.map(Some)
	}

	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError> {
		if order.state == OrderState::Closed || order.instance_id.is_none() {
			return Err(CloudError::InstanceNotFound);
		}
		self.cloud.plugin_for(order)?.get_instance(order).await
	}

	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError> {
		if order.instance_id.is_none() {
			return Ok(());
		}
		let plugin = self.cloud.plugin_for(order)?;
		match plugin.delete_instance(order).await {
			Ok(()) => {
				Self::audit(order, "delete", order.instance_id.as_deref(), Ok(()));
				Ok(())
			},
			Err(CloudError::InstanceNotFound) => {
				tracing::warn!(order_id = %truncate_id(&order.id), "Instance already deleted");
				Ok(())
			},
			Err(e) => {
				Self::audit(order, "delete", order.instance_id.as_deref(), Err(&e));
				Err(e)
			},
		}
	}

	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError> {
		let result = self.cloud.plugin_for(order)?.stop_instance(order).await;
		Self::audit(
			order,
			"stop",
			order.instance_id.as_deref(),
			result.as_ref().map(|_| ()),
		);
		result
	}

	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError> {
		let result = self.cloud.plugin_for(order)?.resume_instance(order).await;
		Self::audit(
			order,
			"resume",
			order.instance_id.as_deref(),
			result.as_ref().map(|_| ()),
		);
		result
	}
}
