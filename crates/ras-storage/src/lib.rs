//! Persistence for order records.
//!
//! This crate is the persistence collaborator of the orchestration core.
//! Backends implement a byte-level [`StorageInterface`]; [`StorageService`]
//! adds typed JSON access on top and the `read_active_orders` query used
//! to rehydrate the order registry at startup.

use async_trait::async_trait;
use ras_types::{ConfigSchema, ImplementationRegistry, Order, OrderState, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level key-value interface implemented by storage backends.
///
/// Keys have the form `namespace:id`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Lists every key starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Factory signature every storage implementation provides.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns every registered storage implementation as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed storage on top of a backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a value as JSON, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves every value stored under a namespace.
	///
	/// Keys removed between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = format!("{}:", namespace);
		let mut values = Vec::new();
		for key in self.backend.list_keys(&prefix).await? {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let value = serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(format!("{}: {}", key, e)))?;
			values.push((key[prefix.len()..].to_string(), value));
		}
		Ok(values)
	}

	/// Persists the current value of an order.
	pub async fn save_order(&self, order: &Order) -> Result<(), StorageError> {
		self.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
	}

	/// Returns every stored order in `state`, oldest first.
	///
	/// Ties on creation time are broken by id so the result is deterministic.
	pub async fn read_active_orders(&self, state: OrderState) -> Result<Vec<Order>, StorageError> {
		let mut orders: Vec<Order> = self
			.retrieve_all::<Order>(StorageKey::Orders.as_str())
			.await?
			.into_iter()
			.map(|(_, order)| order)
			.filter(|order| order.state == state)
			.collect();
		orders.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
		Ok(orders)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use ras_types::ResourceType;

	fn order(id: &str, state: OrderState, created_at: u64) -> Order {
		let mut order = Order::new(ResourceType::Compute, "p1", "p1", "default").with_id(id);
		order.state = state;
		order.created_at = created_at;
		order
	}

	#[tokio::test]
	async fn test_read_active_orders_filters_and_sorts() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		storage.save_order(&order("c", OrderState::Open, 20)).await.unwrap();
		storage.save_order(&order("a", OrderState::Open, 10)).await.unwrap();
		storage.save_order(&order("b", OrderState::Open, 10)).await.unwrap();
		storage
			.save_order(&order("d", OrderState::Fulfilled, 5))
			.await
			.unwrap();

		let open = storage.read_active_orders(OrderState::Open).await.unwrap();
		let ids: Vec<_> = open.iter().map(|o| o.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b", "c"]);

		let fulfilled = storage
			.read_active_orders(OrderState::Fulfilled)
			.await
			.unwrap();
		assert_eq!(fulfilled.len(), 1);
		assert!(storage
			.read_active_orders(OrderState::Closed)
			.await
			.unwrap()
			.is_empty());
	}

	#[tokio::test]
	async fn test_save_order_overwrites() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut o = order("x", OrderState::Open, 1);
		storage.save_order(&o).await.unwrap();

		o.state = OrderState::Selected;
		storage.save_order(&o).await.unwrap();

		let stored = storage.read_active_orders(OrderState::Selected).await.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].id, "x");
		assert!(storage
			.read_active_orders(OrderState::Open)
			.await
			.unwrap()
			.is_empty());
	}
}
