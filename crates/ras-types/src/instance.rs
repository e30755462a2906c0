//! Instance snapshots reported by cloud backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud-side state of the resource backing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
	Creating,
	Ready,
	Busy,
	Stopping,
	Stopped,
	Resuming,
	Deleting,
	Failed,
}

impl fmt::Display for InstanceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			InstanceState::Creating => "CREATING",
			InstanceState::Ready => "READY",
			InstanceState::Busy => "BUSY",
			InstanceState::Stopping => "STOPPING",
			InstanceState::Stopped => "STOPPED",
			InstanceState::Resuming => "RESUMING",
			InstanceState::Deleting => "DELETING",
			InstanceState::Failed => "FAILED",
		};
		f.write_str(name)
	}
}

/// Point-in-time view of a cloud instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
	/// Cloud-assigned identifier.
	pub instance_id: String,
	/// Normalized instance state.
	pub state: InstanceState,
	/// Raw state string as reported by the cloud.
	pub cloud_state: String,
	/// Fault details when the cloud reports one.
	pub fault: Option<String>,
}

impl InstanceSnapshot {
	pub fn new(instance_id: impl Into<String>, state: InstanceState) -> Self {
		Self {
			instance_id: instance_id.into(),
			state,
			cloud_state: state.to_string(),
			fault: None,
		}
	}

	pub fn with_fault(mut self, fault: impl Into<String>) -> Self {
		self.fault = Some(fault.into());
		self
	}

	pub fn is_ready(&self) -> bool {
		self.state == InstanceState::Ready
	}

	pub fn is_stopped(&self) -> bool {
		self.state == InstanceState::Stopped
	}

	pub fn has_failed(&self) -> bool {
		self.state == InstanceState::Failed
	}
}
