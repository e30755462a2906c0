//! Simulated cloud backend.
//!
//! Keeps instances in memory and walks them through CREATING to READY after
//! a configurable number of status polls. Used for development setups and
//! by tests that need a backend with realistic state changes.

use crate::{CloudError, CloudFactory, CloudPlugin, CloudRegistry};
use async_trait::async_trait;
use dashmap::DashMap;
use ras_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, InstanceSnapshot, InstanceState,
	Order, ResourceType, Schema, ValidationError,
};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct SimulatedInstance {
	state: InstanceState,
	polls: u32,
	fault: Option<String>,
}

/// In-memory cloud.
#[derive(Default)]
pub struct SimulatedCloud {
	instances: DashMap<String, SimulatedInstance>,
	ready_after_polls: u32,
	fail_requests: bool,
}

impl SimulatedCloud {
	pub fn new(ready_after_polls: u32, fail_requests: bool) -> Self {
		Self {
			instances: DashMap::new(),
			ready_after_polls,
			fail_requests,
		}
	}

	/// Marks an instance as failed, as if the cloud lost it.
	pub fn fail_instance(&self, instance_id: &str, fault: impl Into<String>) -> bool {
		match self.instances.get_mut(instance_id) {
			Some(mut instance) => {
				instance.state = InstanceState::Failed;
				instance.fault = Some(fault.into());
				true
			},
			None => false,
		}
	}

	/// Number of instances currently allocated.
	pub fn instance_count(&self) -> usize {
		self.instances.len()
	}

	fn instance_id(order: &Order) -> Result<&str, CloudError> {
		order
			.instance_id
			.as_deref()
			.ok_or(CloudError::InstanceNotFound)
	}

	fn require_compute(order: &Order, operation: &str) -> Result<(), CloudError> {
		if order.resource_type != ResourceType::Compute {
			return Err(CloudError::Unsupported(format!(
				"{} is not supported for {}",
				operation, order.resource_type
			)));
		}
		Ok(())
	}

	fn set_state(&self, order: &Order, state: InstanceState) -> Result<(), CloudError> {
		let id = Self::instance_id(order)?;
		let mut instance = self
			.instances
			.get_mut(id)
			.ok_or(CloudError::InstanceNotFound)?;
		instance.state = state;
		Ok(())
	}
}

#[async_trait]
impl CloudPlugin for SimulatedCloud {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedCloudSchema)
	}

	async fn request_instance(&self, order: &Order) -> Result<String, CloudError> {
		if self.fail_requests {
			return Err(CloudError::Backend(format!(
				"simulated quota exceeded for {}",
				order.resource_type
			)));
		}

		let instance_id = format!("sim-{}", uuid::Uuid::new_v4());
		self.instances.insert(
			instance_id.clone(),
			SimulatedInstance {
				state: InstanceState::Creating,
				polls: 0,
				fault: None,
			},
		);
		Ok(instance_id)
	}

	async fn get_instance(&self, order: &Order) -> Result<InstanceSnapshot, CloudError> {
		let id = Self::instance_id(order)?;
		let mut instance = self
			.instances
			.get_mut(id)
			.ok_or(CloudError::InstanceNotFound)?;

		if instance.state == InstanceState::Creating {
			if instance.polls >= self.ready_after_polls {
				instance.state = InstanceState::Ready;
			} else {
				instance.polls += 1;
			}
		}

		let snapshot = InstanceSnapshot::new(id, instance.state);
		Ok(match &instance.fault {
			Some(fault) => snapshot.with_fault(fault.clone()),
			None => snapshot,
		})
	}

	async fn delete_instance(&self, order: &Order) -> Result<(), CloudError> {
		let id = Self::instance_id(order)?;
		self.instances
			.remove(id)
			.map(|_| ())
			.ok_or(CloudError::InstanceNotFound)
	}

	async fn stop_instance(&self, order: &Order) -> Result<(), CloudError> {
		Self::require_compute(order, "stop")?;
		self.set_state(order, InstanceState::Stopped)
	}

	async fn resume_instance(&self, order: &Order) -> Result<(), CloudError> {
		Self::require_compute(order, "resume")?;
		self.set_state(order, InstanceState::Ready)
	}
}

/// Configuration schema for the simulated cloud.
pub struct SimulatedCloudSchema;

impl ConfigSchema for SimulatedCloudSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"ready_after_polls",
					FieldType::Integer {
						min: Some(0),
						max: Some(u32::MAX as i64),
					},
				),
				Field::new("fail_requests", FieldType::Boolean),
			],
		);
		schema.validate(config)
	}
}

/// Creates a simulated cloud.
///
/// Configuration parameters:
/// - `ready_after_polls`: status polls answered with CREATING (default: 0)
/// - `fail_requests`: reject every provisioning request (default: false)
pub fn create_cloud(config: &toml::Value) -> Result<Arc<dyn CloudPlugin>, CloudError> {
	SimulatedCloudSchema
		.validate(config)
		.map_err(|e| CloudError::Configuration(e.to_string()))?;

	let ready_after_polls = config
		.get("ready_after_polls")
		.and_then(|v| v.as_integer())
		.and_then(|v| u32::try_from(v).ok())
		.unwrap_or(0);
	let fail_requests = config
		.get("fail_requests")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	Ok(Arc::new(SimulatedCloud::new(ready_after_polls, fail_requests)))
}

/// Registry for the simulated cloud.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = CloudFactory;

	fn factory() -> Self::Factory {
		create_cloud
	}
}

impl CloudRegistry for Registry {}
