//! Configuration for the resource allocation service.
//!
//! Configuration is read from TOML. Environment variables can be referenced
//! as `${VAR}` or `${VAR:-default}` anywhere in the file, and a configuration
//! can be split across files with `include = ["file1.toml", "file2.toml"]`.
//! Each top-level section must be unique across all included files.

#[cfg(any(test, feature = "testing"))]
pub mod builders;
mod loader;

use ras_types::ResourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this provider within the federation.
	pub provider: ProviderConfig,
	/// Sleep intervals of the state processors.
	#[serde(default)]
	pub processors: ProcessorsConfig,
	/// Persistence backend holding order records.
	pub storage: StorageConfig,
	/// Cloud backends served by this provider.
	pub cloud: CloudConfig,
	/// Inter-provider transport.
	pub transport: TransportConfig,
}

/// Identity of this provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
	/// Provider identifier, compared against an order's provider and requester.
	pub id: String,
}

/// Sleep interval in milliseconds each processor waits after a full pass.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProcessorsConfig {
	#[serde(default = "default_fast_ms")]
	pub open_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub spawning_ms: u64,
	#[serde(default = "default_monitor_ms")]
	pub fulfilled_ms: u64,
	#[serde(default = "default_slow_ms")]
	pub failed_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub stopping_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub resuming_ms: u64,
	#[serde(default = "default_slow_ms")]
	pub unable_to_check_status_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub assigned_for_deletion_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub deleting_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub checking_deletion_ms: u64,
	#[serde(default = "default_fast_ms")]
	pub closed_ms: u64,
	#[serde(default = "default_slow_ms")]
	pub remote_sync_ms: u64,
}

fn default_fast_ms() -> u64 {
	1000
}

fn default_monitor_ms() -> u64 {
	2000
}

fn default_slow_ms() -> u64 {
	5000
}

impl Default for ProcessorsConfig {
	fn default() -> Self {
		Self {
			open_ms: default_fast_ms(),
			spawning_ms: default_fast_ms(),
			fulfilled_ms: default_monitor_ms(),
			failed_ms: default_slow_ms(),
			stopping_ms: default_fast_ms(),
			resuming_ms: default_fast_ms(),
			unable_to_check_status_ms: default_slow_ms(),
			assigned_for_deletion_ms: default_fast_ms(),
			deleting_ms: default_fast_ms(),
			checking_deletion_ms: default_fast_ms(),
			closed_ms: default_fast_ms(),
			remote_sync_ms: default_slow_ms(),
		}
	}
}

impl ProcessorsConfig {
	/// Every interval paired with its key, for validation and logging.
	pub fn entries(&self) -> [(&'static str, u64); 12] {
		[
			("open_ms", self.open_ms),
			("spawning_ms", self.spawning_ms),
			("fulfilled_ms", self.fulfilled_ms),
			("failed_ms", self.failed_ms),
			("stopping_ms", self.stopping_ms),
			("resuming_ms", self.resuming_ms),
			("unable_to_check_status_ms", self.unable_to_check_status_ms),
			("assigned_for_deletion_ms", self.assigned_for_deletion_ms),
			("deleting_ms", self.deleting_ms),
			("checking_deletion_ms", self.checking_deletion_ms),
			("closed_ms", self.closed_ms),
			("remote_sync_ms", self.remote_sync_ms),
		]
	}

	/// Converts a millisecond setting to a duration.
	pub fn interval(ms: u64) -> Duration {
		Duration::from_millis(ms)
	}
}

/// Persistence backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Cloud backends served by this provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudConfig {
	/// Cloud used when an order does not name one.
	pub default_cloud: String,
	/// Named clouds and the plugin serving each of them.
	pub clouds: HashMap<String, CloudEntryConfig>,
}

/// A single named cloud.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudEntryConfig {
	/// Registered plugin implementation name.
	pub implementation: String,
	/// Resource types this cloud serves.
	#[serde(default = "default_resource_types")]
	pub resource_types: Vec<ResourceType>,
	/// Plugin specific settings, validated by the plugin's schema.
	#[serde(flatten)]
	pub settings: toml::Table,
}

fn default_resource_types() -> Vec<ResourceType> {
	ResourceType::ALL.to_vec()
}

/// Inter-provider transport selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Map of transport implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports defaults
/// with `${VAR_NAME:-default_value}`. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)));
			},
		};
		replacements.push((full.start(), full.end(), value));
	}

	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}
	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following include directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.provider.id.trim().is_empty() {
			return Err(ConfigError::Validation("Provider ID cannot be empty".into()));
		}

		for (key, ms) in self.processors.entries() {
			if ms == 0 {
				return Err(ConfigError::Validation(format!(
					"processors.{} must be greater than zero",
					key
				)));
			}
		}

		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' has no entry under storage.implementations",
				self.storage.primary
			)));
		}

		if self.cloud.clouds.is_empty() {
			return Err(ConfigError::Validation(
				"At least one cloud must be configured".into(),
			));
		}
		if !self.cloud.clouds.contains_key(&self.cloud.default_cloud) {
			return Err(ConfigError::Validation(format!(
				"Default cloud '{}' has no entry under cloud.clouds",
				self.cloud.default_cloud
			)));
		}
		for (name, cloud) in &self.cloud.clouds {
			if cloud.implementation.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Cloud '{}' must name an implementation",
					name
				)));
			}
			if cloud.resource_types.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Cloud '{}' must serve at least one resource type",
					name
				)));
			}
		}

		if !self
			.transport
			.implementations
			.contains_key(&self.transport.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary transport '{}' has no entry under transport.implementations",
				self.transport.primary
			)));
		}

		Ok(())
	}
}

/// Parses, resolves environment variables and validates.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[provider]
id = "provider-a"

[storage]
primary = "memory"
[storage.implementations.memory]

[cloud]
default_cloud = "default"
[cloud.clouds.default]
implementation = "simulated"
ready_after_polls = 2

[transport]
primary = "loopback"
[transport.implementations.loopback]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("RAS_TEST_HOST", "localhost");
		std::env::set_var("RAS_TEST_PORT", "5432");

		let input = "host = \"${RAS_TEST_HOST}:${RAS_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("RAS_TEST_HOST");
		std::env::remove_var("RAS_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${RAS_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${RAS_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("RAS_MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.provider.id, "provider-a");
		assert_eq!(config.processors, ProcessorsConfig::default());

		let cloud = &config.cloud.clouds["default"];
		assert_eq!(cloud.implementation, "simulated");
		assert_eq!(cloud.resource_types, ResourceType::ALL.to_vec());
		assert_eq!(
			cloud.settings.get("ready_after_polls").and_then(|v| v.as_integer()),
			Some(2)
		);
	}

	#[test]
	fn test_provider_id_from_env() {
		std::env::set_var("RAS_TEST_PROVIDER", "provider-env");
		let input = MINIMAL.replace("\"provider-a\"", "\"${RAS_TEST_PROVIDER}\"");

		let config: Config = input.parse().unwrap();
		assert_eq!(config.provider.id, "provider-env");

		std::env::remove_var("RAS_TEST_PROVIDER");
	}

	#[test]
	fn test_zero_interval_rejected() {
		let input = format!("{}\n[processors]\nopen_ms = 0\n", MINIMAL);
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("processors.open_ms"));
	}

	#[test]
	fn test_unknown_default_cloud_rejected() {
		let input = MINIMAL.replace("default_cloud = \"default\"", "default_cloud = \"edge\"");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Default cloud 'edge'"));
	}

	#[test]
	fn test_missing_primary_storage_rejected() {
		let input = MINIMAL.replace("primary = \"memory\"", "primary = \"file\"");
		let err = input.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'file'"));
	}
}
