//! Configuration builder with in-memory defaults.
//!
//! Produces a configuration backed by memory storage, the simulated cloud
//! and the loopback transport, with short processor intervals.

use crate::{
	CloudConfig, CloudEntryConfig, Config, ProcessorsConfig, ProviderConfig, StorageConfig,
	TransportConfig,
};
use ras_types::ResourceType;
use std::collections::HashMap;

/// Builder for `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	provider_id: String,
	processor_interval_ms: u64,
	ready_after_polls: i64,
	fail_requests: bool,
	storage_primary: String,
	storage_path: Option<String>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			provider_id: "test-provider".to_string(),
			processor_interval_ms: 10,
			ready_after_polls: 0,
			fail_requests: false,
			storage_primary: "memory".to_string(),
			storage_path: None,
		}
	}

	pub fn provider_id(mut self, id: impl Into<String>) -> Self {
		self.provider_id = id.into();
		self
	}

	/// Uses the same sleep interval for every processor.
	pub fn processor_interval_ms(mut self, ms: u64) -> Self {
		self.processor_interval_ms = ms;
		self
	}

	/// Polls the simulated cloud answers CREATING before READY.
	pub fn ready_after_polls(mut self, polls: i64) -> Self {
		self.ready_after_polls = polls;
		self
	}

	/// Makes the simulated cloud reject provisioning requests.
	pub fn fail_requests(mut self, fail: bool) -> Self {
		self.fail_requests = fail;
		self
	}

	/// Switches to file storage rooted at `path`.
	pub fn file_storage(mut self, path: impl Into<String>) -> Self {
		self.storage_primary = "file".to_string();
		self.storage_path = Some(path.into());
		self
	}

	pub fn build(self) -> Config {
		let ms = self.processor_interval_ms;
		let processors = ProcessorsConfig {
			open_ms: ms,
			spawning_ms: ms,
			fulfilled_ms: ms,
			failed_ms: ms,
			stopping_ms: ms,
			resuming_ms: ms,
			unable_to_check_status_ms: ms,
			assigned_for_deletion_ms: ms,
			deleting_ms: ms,
			checking_deletion_ms: ms,
			closed_ms: ms,
			remote_sync_ms: ms,
		};

		let mut storage_settings = toml::Table::new();
		if let Some(path) = self.storage_path {
			storage_settings.insert("storage_path".to_string(), toml::Value::String(path));
		}

		let mut cloud_settings = toml::Table::new();
		cloud_settings.insert(
			"ready_after_polls".to_string(),
			toml::Value::Integer(self.ready_after_polls),
		);
		cloud_settings.insert(
			"fail_requests".to_string(),
			toml::Value::Boolean(self.fail_requests),
		);

		Config {
			provider: ProviderConfig {
				id: self.provider_id,
			},
			processors,
			storage: StorageConfig {
				primary: self.storage_primary.clone(),
				implementations: HashMap::from([(
					self.storage_primary,
					toml::Value::Table(storage_settings),
				)]),
			},
			cloud: CloudConfig {
				default_cloud: "default".to_string(),
				clouds: HashMap::from([(
					"default".to_string(),
					CloudEntryConfig {
						implementation: "simulated".to_string(),
						resource_types: ResourceType::ALL.to_vec(),
						settings: cloud_settings,
					},
				)]),
			},
			transport: TransportConfig {
				primary: "loopback".to_string(),
				implementations: HashMap::from([(
					"loopback".to_string(),
					toml::Value::Table(toml::Table::new()),
				)]),
			},
		}
	}
}
