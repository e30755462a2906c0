//! Connector for orders forwarded to another provider.

use super::CloudConnector;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_transport::{RemoteFailure, TransportError, TransportService};
use ras_types::{InstanceSnapshot, Order};
use std::sync::Arc;

/// Issues cloud operations to the owning provider over the transport.
pub struct RemoteConnector {
	transport: Arc<TransportService>,
}

impl RemoteConnector {
	pub fn new(transport: Arc<TransportService>) -> Self {
		Self { transport }
	}
}

/// Translates a transport failure into the error a local plugin would report.
pub(crate) fn cloud_error(e: TransportError) -> CloudError {
	match e {
		TransportError::Communication(message) => CloudError::Communication(message),
		TransportError::Configuration(message) => CloudError::Configuration(message),
		TransportError::Remote { provider, failure } => match failure {
			RemoteFailure::InstanceNotFound | RemoteFailure::OrderNotFound(_) => {
				CloudError::InstanceNotFound
			},
			RemoteFailure::Busy(id) => {
				CloudError::Communication(format!("order {} busy at {}", id, provider))
			},
			RemoteFailure::Backend(message) | RemoteFailure::Rejected(message) => {
				CloudError::Backend(format!("{}: {}", provider, message))
			},
		},
	}
}

#[async_trait]
impl CloudConnector for RemoteConnector {
	/// The owner assigns the instance id later; it reaches this side through
	/// the owner's signals and the sync processor.
	async fn request_instance(&self, order: &Order) -> Result<Option<String>, CloudError> {
		self.transport
			.create_remote_order(order)
			.await
			.map_err(cloud_error)?;
		Ok(None)
	}

	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError> {
		self.transport
			.get_remote_instance(order)
			.await
			.map_err(cloud_error)
	}

	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.transport
			.delete_remote_order(order)
			.await
			.map_err(cloud_error)
	}

	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.transport
			.stop_remote_instance(order)
			.await
			.map_err(cloud_error)
	}

	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError> {
		self.transport
			.resume_remote_instance(order)
			.await
			.map_err(cloud_error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transport_errors_map_to_cloud_errors() {
		let remote = |failure| TransportError::Remote {
			provider: "p2".to_string(),
			failure,
		};

		assert_eq!(
			cloud_error(remote(RemoteFailure::OrderNotFound("a".to_string()))),
			CloudError::InstanceNotFound
		);
		assert_eq!(
			cloud_error(remote(RemoteFailure::Backend("quota".to_string()))),
			CloudError::Backend("p2: quota".to_string())
		);
		assert!(matches!(
			cloud_error(TransportError::Communication("down".to_string())),
			CloudError::Communication(_)
		));
		assert!(matches!(
			cloud_error(remote(RemoteFailure::Busy("a".to_string()))),
			CloudError::Communication(_)
		));
	}
}
