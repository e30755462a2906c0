//! Builder for the resource allocation engine.
//!
//! Composes a [`RasEngine`] from the storage, cloud and transport
//! implementations named in the configuration, using factory functions
//! registered by name.

use crate::connector::{CloudConnector, ConnectorDispatch, LocalConnector, RemoteConnector};
use crate::engine::{event_bus::EventBus, ProcessorFleet, RasEngine};
use crate::facade::{FederationFacade, OrderFacade};
use crate::orders::{LazyRegistry, RegistryError};
use crate::processors::ProcessorContext;
use crate::state::StateCoordinator;
use ras_cloud::{CloudFactory, CloudService};
use ras_config::Config;
use ras_storage::{StorageFactory, StorageInterface, StorageService};
use ras_transport::{TransportFactory, TransportInterface, TransportService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building an engine.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),
}

/// Factory functions for every pluggable component, keyed by
/// implementation name.
pub struct RasFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub cloud_factories: HashMap<String, CloudFactory>,
	pub transport_factories: HashMap<String, TransportFactory>,
}

impl RasFactories {
	/// Every implementation compiled into the workspace.
	pub fn builtin() -> Self {
		Self {
			storage_factories: ras_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			cloud_factories: ras_cloud::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			transport_factories: ras_transport::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// Builder for constructing a [`RasEngine`].
///
/// Components can be supplied directly instead of through factories,
/// which is how several providers share one process in tests.
pub struct RasBuilder {
	config: Config,
	storage: Option<Arc<StorageService>>,
	cloud: Option<Arc<CloudService>>,
	transport: Option<Box<dyn TransportInterface>>,
}

impl RasBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage: None,
			cloud: None,
			transport: None,
		}
	}

	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	pub fn with_cloud(mut self, cloud: Arc<CloudService>) -> Self {
		self.cloud = Some(cloud);
		self
	}

	pub fn with_transport(mut self, transport: Box<dyn TransportInterface>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Builds the engine and rehydrates its registry from storage.
	pub async fn build(self, factories: RasFactories) -> Result<RasEngine, BuilderError> {
		let provider_id = self.config.provider.id.clone();

		let storage = match self.storage {
			Some(storage) => storage,
			None => Arc::new(StorageService::new(create_storage(
				&self.config,
				&factories,
			)?)),
		};
		let cloud = match self.cloud {
			Some(cloud) => cloud,
			None => Arc::new(create_clouds(&self.config, &factories)?),
		};
		let transport = match self.transport {
			Some(transport) => transport,
			None => create_transport(&self.config, &factories)?,
		};
		let transport = Arc::new(TransportService::new(transport));

		let registry = LazyRegistry::new(storage).get().await?;
		tracing::info!(
			component = "registry",
			orders = registry.len(),
			"Loaded"
		);

		let event_bus = EventBus::default();
		let coordinator = Arc::new(StateCoordinator::new(
			registry.clone(),
			transport.clone(),
			&provider_id,
			event_bus.clone(),
		));
		let connector: Arc<dyn CloudConnector> = Arc::new(ConnectorDispatch::new(
			&provider_id,
			LocalConnector::new(cloud),
			RemoteConnector::new(transport.clone()),
		));

		let fleet = Arc::new(ProcessorFleet::new(
			ProcessorContext {
				registry: registry.clone(),
				coordinator: coordinator.clone(),
				connector: connector.clone(),
				local_provider: provider_id.clone(),
			},
			transport,
			self.config.processors.clone(),
		));
		let facade = Arc::new(OrderFacade::new(
			registry.clone(),
			coordinator.clone(),
			connector,
			&provider_id,
			event_bus.clone(),
		));
		let federation = Arc::new(FederationFacade::new(facade.clone()));

		Ok(RasEngine {
			config: self.config,
			registry,
			coordinator,
			facade,
			federation,
			fleet,
			event_bus,
		})
	}
}

fn create_storage(
	config: &Config,
	factories: &RasFactories,
) -> Result<Box<dyn StorageInterface>, BuilderError> {
	let mut storage_impls = HashMap::new();
	for (name, settings) in &config.storage.implementations {
		if let Some(factory) = factories.storage_factories.get(name) {
			match factory(settings) {
				Ok(implementation) => {
					let is_primary = &config.storage.primary == name;
					tracing::info!(
						component = "storage",
						implementation = %name,
						enabled = %is_primary,
						"Loaded"
					);
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}
	}

	storage_impls.remove(&config.storage.primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary storage '{}' has no registered implementation",
			config.storage.primary
		))
	})
}

/// Creates one plugin per configured cloud and registers it for each
/// resource type that cloud serves.
fn create_clouds(config: &Config, factories: &RasFactories) -> Result<CloudService, BuilderError> {
	let mut service = CloudService::new(config.cloud.default_cloud.clone());
	let mut names: Vec<&String> = config.cloud.clouds.keys().collect();
	names.sort();

	for cloud_name in names {
		let entry = &config.cloud.clouds[cloud_name];
		let factory = factories
			.cloud_factories
			.get(&entry.implementation)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Cloud '{}' uses unknown implementation '{}'",
					cloud_name, entry.implementation
				))
			})?;
		let plugin = factory(&toml::Value::Table(entry.settings.clone())).map_err(|e| {
			tracing::error!(
				component = "cloud",
				implementation = %entry.implementation,
				cloud = %cloud_name,
				error = %e,
				"Failed to create cloud plugin"
			);
			BuilderError::Config(format!(
				"Failed to create cloud '{}': {}",
				cloud_name, e
			))
		})?;
		for resource_type in &entry.resource_types {
			service.register(*resource_type, cloud_name.clone(), plugin.clone());
		}
		tracing::info!(
			component = "cloud",
			implementation = %entry.implementation,
			cloud = %cloud_name,
			resource_types = ?entry.resource_types,
			"Loaded"
		);
	}
	Ok(service)
}

fn create_transport(
	config: &Config,
	factories: &RasFactories,
) -> Result<Box<dyn TransportInterface>, BuilderError> {
	let primary = &config.transport.primary;
	let settings = config.transport.implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!("Transport '{}' is not configured", primary))
	})?;
	let factory = factories.transport_factories.get(primary).ok_or_else(|| {
		BuilderError::Config(format!("Transport '{}' has no registered implementation", primary))
	})?;
	let transport = factory(&config.provider.id, settings).map_err(|e| {
		BuilderError::Config(format!(
			"Failed to create transport implementation '{}': {}",
			primary, e
		))
	})?;
	tracing::info!(component = "transport", implementation = %primary, "Loaded");
	Ok(transport)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ras_config::builders::ConfigBuilder;
	use ras_types::{Order, OrderState, ResourceType};

	#[tokio::test]
	async fn test_build_from_builtin_factories() {
		let config = ConfigBuilder::new().provider_id("p1").build();
		let engine = RasBuilder::new(config)
			.build(RasFactories::builtin())
			.await
			.unwrap();
		assert_eq!(engine.provider_id(), "p1");
		assert!(engine.registry().is_empty());
		assert!(!engine.fleet().is_running());
	}

	#[tokio::test]
	async fn test_unknown_implementations_are_rejected() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".to_string();
		assert!(matches!(
			RasBuilder::new(config).build(RasFactories::builtin()).await,
			Err(BuilderError::Config(_))
		));

		let mut config = ConfigBuilder::new().build();
		if let Some(entry) = config.cloud.clouds.get_mut("default") {
			entry.implementation = "openstack".to_string();
		}
		assert!(matches!(
			RasBuilder::new(config).build(RasFactories::builtin()).await,
			Err(BuilderError::Config(_))
		));
	}

	#[tokio::test]
	async fn test_build_rehydrates_from_supplied_storage() {
		let storage = crate::test_support::memory_storage();
		let mut order = Order::new(ResourceType::Network, "p1", "p1", "default").with_id("n1");
		order.state = OrderState::Fulfilled;
		storage.save_order(&order).await.unwrap();

		let engine = RasBuilder::new(ConfigBuilder::new().provider_id("p1").build())
			.with_storage(storage)
			.build(RasFactories::builtin())
			.await
			.unwrap();
		assert_eq!(
			engine.orders().get_order("n1").await.unwrap().state,
			OrderState::Fulfilled
		);
	}
}
