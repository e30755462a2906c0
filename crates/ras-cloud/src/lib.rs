//! Cloud backend plugins.
//!
//! A plugin provisions, inspects and releases the cloud resources backing
//! orders of one or more resource types within a named cloud. The service
//! resolves plugins by `(resource type, cloud name)` through [`CloudService`],
//! which is assembled at startup from a compile-time registry of factories.

use async_trait::async_trait;
use ras_types::{ConfigSchema, ImplementationRegistry, InstanceSnapshot, Order, ResourceType};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod simulated;
}

/// Failures reported by cloud backends and the connectors built on them.
///
/// `InstanceNotFound` is kept apart from other failures because several
/// processors treat it as "the resource is gone" rather than as an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
	#[error("Instance not found")]
	InstanceNotFound,
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Communication error: {0}")]
	Communication(String),
	#[error("Unsupported operation: {0}")]
	Unsupported(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl CloudError {
	pub fn is_instance_not_found(&self) -> bool {
		matches!(self, CloudError::InstanceNotFound)
	}
}

/// Interface implemented by every cloud backend.
#[async_trait]
pub trait CloudPlugin: Send + Sync {
	/// Returns the configuration schema for this plugin.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Requests a new instance for the order and returns its cloud identifier.
	async fn request_instance(&self, order: &Order) -> Result<String, CloudError>;

	/// Returns the current snapshot of the order's instance.
	///
	/// Must fail with `InstanceNotFound` when the instance does not exist.
	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError>;

	/// Deletes the order's instance.
	///
	/// Deleting an instance that is already gone fails with `InstanceNotFound`
	/// and nothing else, so repeated deletions are safe for the caller.
	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError>;

	/// Stops a compute instance.
	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError> {
		Err(CloudError::Unsupported(format!(
			"stop is not supported for {}",
			order.resource_type
		)))
	}

	/// Resumes a stopped compute instance.
	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError> {
		Err(CloudError::Unsupported(format!(
			"resume is not supported for {}",
			order.resource_type
		)))
	}
}

/// Factory signature every cloud plugin provides.
pub type CloudFactory = fn(&toml::Value) -> Result<Arc<dyn CloudPlugin>, CloudError>;

/// Registry trait for cloud plugin implementations.
pub trait CloudRegistry: ImplementationRegistry<Factory = CloudFactory> {}

/// Returns every registered cloud plugin as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, CloudFactory)> {
	use implementations::simulated;

	vec![(simulated::Registry::NAME, simulated::Registry::factory())]
}

/// Resolves the plugin serving an order.
pub struct CloudService {
	plugins: HashMap<(ResourceType, String), Arc<dyn CloudPlugin>>,
	default_cloud: String,
}

impl CloudService {
	pub fn new(default_cloud: impl Into<String>) -> Self {
		Self {
			plugins: HashMap::new(),
			default_cloud: default_cloud.into(),
		}
	}

	/// Registers a plugin for a resource type within a cloud.
	pub fn register(
		&mut self,
		resource_type: ResourceType,
		cloud_name: impl Into<String>,
		plugin: Arc<dyn CloudPlugin>,
	) {
		self.plugins
			.insert((resource_type, cloud_name.into()), plugin);
	}

	/// Name of the cloud used when an order does not name one.
	pub fn default_cloud(&self) -> &str {
		&self.default_cloud
	}

	/// Returns the plugin for the order's resource type and cloud.
	pub fn plugin_for(&self, order: &Order) -> Result<Arc<dyn CloudPlugin>, CloudError> {
		let cloud = if order.cloud_name.is_empty() {
			self.default_cloud.as_str()
		} else {
			order.cloud_name.as_str()
		};
		self.plugins
			.get(&(order.resource_type, cloud.to_string()))
			.cloned()
			.ok_or_else(|| {
				CloudError::Configuration(format!(
					"No {} plugin configured for cloud '{}'",
					order.resource_type, cloud
				))
			})
	}

	/// Clouds that have at least one plugin registered.
	pub fn cloud_names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.plugins.keys().map(|(_, c)| c.clone()).collect();
		names.sort();
		names.dedup();
		names
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::simulated::SimulatedCloud;

	#[test]
	fn test_plugin_resolution() {
		let plugin: Arc<dyn CloudPlugin> = Arc::new(SimulatedCloud::default());
		let mut service = CloudService::new("default");
		service.register(ResourceType::Compute, "default", plugin.clone());
		service.register(ResourceType::Volume, "edge", plugin);

		let mut order = Order::new(ResourceType::Compute, "p1", "p1", "");
		assert!(service.plugin_for(&order).is_ok());

		order.cloud_name = "edge".to_string();
		assert!(matches!(
			service.plugin_for(&order),
			Err(CloudError::Configuration(_))
		));

		order.resource_type = ResourceType::Volume;
		assert!(service.plugin_for(&order).is_ok());
		assert_eq!(service.cloud_names(), vec!["default", "edge"]);
	}
}
