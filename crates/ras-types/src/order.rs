//! Order model for the resource allocation service.
//!
//! An order is a tracked request for a cloud resource. It is created by the
//! API layer in the OPEN state and advanced through its lifecycle by the
//! state processors until it is closed and evicted from the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::current_timestamp;

/// Globally unique order identifier.
pub type OrderId = String;

/// Lifecycle states an order moves through.
///
/// The `state` field of an order must always match the registry list the
/// order is a member of. Only the state transition coordinator changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
	/// Submitted, not yet dispatched.
	Open,
	/// Claimed by the open processor before the provisioning call.
	Selected,
	/// Local provisioning call succeeded, instance not yet ready.
	Spawning,
	/// Forwarded to a remote provider, awaiting its reports.
	Pending,
	/// Instance observed ready.
	Fulfilled,
	/// Provisioning call itself failed.
	FailedOnRequest,
	/// Instance later became unreachable or failed.
	FailedAfterSuccessfulRequest,
	/// Monitoring call itself failed.
	UnableToCheckStatus,
	/// Stop requested, waiting for the instance to stop.
	Stopping,
	/// Instance stopped.
	Stopped,
	/// Resume requested, waiting for the instance to become ready.
	Resuming,
	/// Deletion requested, deletion call not yet issued.
	AssignedForDeletion,
	/// Deletion call issued by the request path, awaiting disappearance.
	Deleting,
	/// Deletion issued by the assigned-for-deletion processor, polling for disappearance.
	CheckingDeletion,
	/// Terminal.
	Closed,
}

impl OrderState {
	/// Every state, in declaration order.
	pub const ALL: [OrderState; 15] = [
		OrderState::Open,
		OrderState::Selected,
		OrderState::Spawning,
		OrderState::Pending,
		OrderState::Fulfilled,
		OrderState::FailedOnRequest,
		OrderState::FailedAfterSuccessfulRequest,
		OrderState::UnableToCheckStatus,
		OrderState::Stopping,
		OrderState::Stopped,
		OrderState::Resuming,
		OrderState::AssignedForDeletion,
		OrderState::Deleting,
		OrderState::CheckingDeletion,
		OrderState::Closed,
	];

	/// Returns the canonical name of the state.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderState::Open => "OPEN",
			OrderState::Selected => "SELECTED",
			OrderState::Spawning => "SPAWNING",
			OrderState::Pending => "PENDING",
			OrderState::Fulfilled => "FULFILLED",
			OrderState::FailedOnRequest => "FAILED_ON_REQUEST",
			OrderState::FailedAfterSuccessfulRequest => "FAILED_AFTER_SUCCESSFUL_REQUEST",
			OrderState::UnableToCheckStatus => "UNABLE_TO_CHECK_STATUS",
			OrderState::Stopping => "STOPPING",
			OrderState::Stopped => "STOPPED",
			OrderState::Resuming => "RESUMING",
			OrderState::AssignedForDeletion => "ASSIGNED_FOR_DELETION",
			OrderState::Deleting => "DELETING",
			OrderState::CheckingDeletion => "CHECKING_DELETION",
			OrderState::Closed => "CLOSED",
		}
	}

	/// Returns true for the two failure states.
	pub fn is_failure(&self) -> bool {
		matches!(
			self,
			OrderState::FailedOnRequest | OrderState::FailedAfterSuccessfulRequest
		)
	}

	/// Returns true if a remote requester must be told when its order enters this state.
	pub fn requires_requester_signal(&self) -> bool {
		matches!(
			self,
			OrderState::Fulfilled
				| OrderState::FailedOnRequest
				| OrderState::FailedAfterSuccessfulRequest
		)
	}

	/// Returns true while a deletion of the order is in progress.
	pub fn is_deletion_in_progress(&self) -> bool {
		matches!(
			self,
			OrderState::AssignedForDeletion | OrderState::Deleting | OrderState::CheckingDeletion
		)
	}
}

impl fmt::Display for OrderState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderState {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderState::ALL
			.into_iter()
			.find(|state| state.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| format!("Unknown order state: {}", s))
	}
}

/// Kind of cloud resource an order requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
	Compute,
	Network,
	Volume,
	Attachment,
}

impl ResourceType {
	pub const ALL: [ResourceType; 4] = [
		ResourceType::Compute,
		ResourceType::Network,
		ResourceType::Volume,
		ResourceType::Attachment,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ResourceType::Compute => "compute",
			ResourceType::Network => "network",
			ResourceType::Volume => "volume",
			ResourceType::Attachment => "attachment",
		}
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ResourceType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ResourceType::ALL
			.into_iter()
			.find(|kind| kind.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| format!("Unknown resource type: {}", s))
	}
}

/// Authenticated identity of the user that submitted an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUser {
	/// User identifier within the identity provider.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Identity provider that authenticated the user.
	pub identity_provider: String,
}

/// A tracked request for a cloud resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier, immutable once assigned.
	pub id: OrderId,
	/// Kind of resource requested.
	pub resource_type: ResourceType,
	/// Provider that submitted the order.
	pub requester: String,
	/// Provider that owns and serves the order.
	pub provider: String,
	/// Cloud within the providing provider.
	pub cloud_name: String,
	/// Current lifecycle state.
	pub state: OrderState,
	/// Cloud-assigned instance identifier, set once provisioning succeeds.
	pub instance_id: Option<String>,
	/// Authenticated user that submitted the order.
	pub system_user: Option<SystemUser>,
	/// Last fault observed while processing the order.
	pub fault_message: Option<String>,
	/// Set when a remote-owned order's provisioning request failed locally.
	///
	/// The mirror stays PENDING so the owner is not contradicted, while this
	/// side remembers the failure.
	#[serde(default)]
	pub failed_on_request: bool,
	/// State a SELECTED order moves to once its resource request has been
	/// answered. Kept until that transition succeeds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selection_outcome: Option<OrderState>,
	/// Orders this order needs while it is alive.
	#[serde(default)]
	pub dependencies: Vec<OrderId>,
	/// Free-form requirements used for backend selection.
	#[serde(default)]
	pub requirements: BTreeMap<String, String>,
	/// Backend specific fields, opaque to the orchestration core.
	#[serde(default)]
	pub spec: serde_json::Value,
	/// Creation timestamp in unix seconds.
	pub created_at: u64,
	/// Last modification timestamp in unix seconds.
	pub updated_at: u64,
}

impl Order {
	/// Creates a new OPEN order with a fresh identifier.
	pub fn new(
		resource_type: ResourceType,
		requester: impl Into<String>,
		provider: impl Into<String>,
		cloud_name: impl Into<String>,
	) -> Self {
		let now = current_timestamp();
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			resource_type,
			requester: requester.into(),
			provider: provider.into(),
			cloud_name: cloud_name.into(),
			state: OrderState::Open,
			instance_id: None,
			system_user: None,
			fault_message: None,
			failed_on_request: false,
			selection_outcome: None,
			dependencies: Vec::new(),
			requirements: BTreeMap::new(),
			spec: serde_json::Value::Null,
			created_at: now,
			updated_at: now,
		}
	}

	/// Replaces the generated identifier.
	pub fn with_id(mut self, id: impl Into<OrderId>) -> Self {
		self.id = id.into();
		self
	}

	/// Sets the orders this order depends on.
	pub fn with_dependencies(mut self, dependencies: Vec<OrderId>) -> Self {
		self.dependencies = dependencies;
		self
	}

	/// Sets the authenticated user.
	pub fn with_system_user(mut self, user: SystemUser) -> Self {
		self.system_user = Some(user);
		self
	}

	pub fn is_provider_local(&self, local_provider: &str) -> bool {
		self.provider == local_provider
	}

	pub fn is_provider_remote(&self, local_provider: &str) -> bool {
		!self.is_provider_local(local_provider)
	}

	pub fn is_requester_local(&self, local_provider: &str) -> bool {
		self.requester == local_provider
	}

	pub fn is_requester_remote(&self, local_provider: &str) -> bool {
		!self.is_requester_local(local_provider)
	}

	/// Records the latest fault message.
	pub fn record_fault(&mut self, message: impl Into<String>) {
		self.fault_message = Some(message.into());
	}

	/// Returns the state as seen by this provider, including the local
	/// FAILED_ON_REQUEST marker of remote-owned orders.
	pub fn observed_state(&self) -> OrderState {
		if self.failed_on_request {
			OrderState::FailedOnRequest
		} else {
			self.state
		}
	}

	/// Refreshes the modification timestamp.
	pub fn touch(&mut self) {
		self.updated_at = current_timestamp();
	}
}
