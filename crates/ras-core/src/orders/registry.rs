//! Registry of active orders.
//!
//! Holds one [`OrderList`] per state and a map from order id to the shared
//! entry. The registry only indexes orders; moving an order between lists
//! is the job of the state coordinator, which holds the order's lock while
//! it does so.

use super::{OrderDependencies, OrderEntry, OrderList, SharedOrder};
use dashmap::{mapref::entry::Entry, DashMap};
use ras_storage::StorageService;
use ras_types::{truncate_id, Order, OrderId, OrderState};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("Order already active: {0}")]
	AlreadyActive(OrderId),
	#[error("Order not active: {0}")]
	NotActive(OrderId),
	#[error("Order {id} is not a member of the {state} list")]
	NotInList { id: OrderId, state: OrderState },
	#[error("Storage error: {0}")]
	Storage(String),
}

impl RegistryError {
	/// True for errors that mean the registry's indexes disagree with an
	/// order's state, which no retry can fix.
	pub fn is_defect(&self) -> bool {
		matches!(
			self,
			RegistryError::AlreadyActive(_)
				| RegistryError::NotActive(_)
				| RegistryError::NotInList { .. }
		)
	}
}

/// In-memory index of every active order.
pub struct OrderRegistry {
	lists: HashMap<OrderState, OrderList>,
	active: DashMap<OrderId, SharedOrder>,
	dependencies: OrderDependencies,
	storage: Arc<StorageService>,
}

impl OrderRegistry {
	/// Creates an empty registry with one list per state.
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			lists: OrderState::ALL
				.into_iter()
				.map(|state| (state, OrderList::new()))
				.collect(),
			active: DashMap::new(),
			dependencies: OrderDependencies::new(),
			storage,
		}
	}

	/// Rebuilds the registry from persisted orders.
	///
	/// Every state except CLOSED is read back, oldest first, so each list
	/// starts in the order the orders were created.
	pub async fn load(storage: Arc<StorageService>) -> Result<Self, RegistryError> {
		let registry = Self::new(storage);
		for state in OrderState::ALL {
			if state == OrderState::Closed {
				continue;
			}
			let orders = registry
				.storage
				.read_active_orders(state)
				.await
				.map_err(|e| RegistryError::Storage(e.to_string()))?;
			for order in orders {
				registry.insert_recovered(order);
			}
		}
		tracing::info!(orders = registry.len(), "Order registry loaded");
		Ok(registry)
	}

	fn insert_recovered(&self, order: Order) {
		let state = order.state;
		self.dependencies.register(&order);
		let entry = OrderEntry::new(order);
		self.active.insert(entry.id().to_string(), entry.clone());
		if let Some(list) = self.lists.get(&state) {
			list.add_item(entry);
		}
	}

	/// Admits a new order in the OPEN state.
	///
	/// The order is persisted before it becomes visible in a state list. The
	/// entry stays locked throughout, so nobody who finds it in the map can
	/// act on it before it is in place.
	pub async fn activate_order(&self, mut order: Order) -> Result<SharedOrder, RegistryError> {
		order.state = OrderState::Open;
		order.touch();
		let entry = OrderEntry::new(order);
		let guard = entry.lock().await;

		match self.active.entry(entry.id().to_string()) {
			Entry::Occupied(_) => {
				return Err(RegistryError::AlreadyActive(entry.id().to_string()));
			},
			Entry::Vacant(vacant) => {
				vacant.insert(entry.clone());
			},
		}

		if let Err(e) = self.storage.save_order(&guard).await {
			self.active.remove(entry.id());
			return Err(RegistryError::Storage(e.to_string()));
		}

		self.dependencies.register(&guard);
		if let Some(list) = self.lists.get(&OrderState::Open) {
			list.add_item(entry.clone());
		}
		drop(guard);

		tracing::info!(order_id = %truncate_id(entry.id()), "Order activated");
		Ok(entry.clone())
	}

	/// Removes an order from the map and from the list of its current state.
	///
	/// The caller holds the order's lock and passes its current value. On
	/// error nothing is removed.
	pub fn deactivate_order(
		&self,
		entry: &SharedOrder,
		order: &Order,
	) -> Result<(), RegistryError> {
		if !self.active.contains_key(entry.id()) {
			return Err(RegistryError::NotActive(entry.id().to_string()));
		}
		let removed = self
			.lists
			.get(&order.state)
			.is_some_and(|list| list.remove_item(entry));
		if !removed {
			return Err(RegistryError::NotInList {
				id: entry.id().to_string(),
				state: order.state,
			});
		}
		self.active.remove(entry.id());
		self.dependencies.release(order);
		tracing::debug!(
			order_id = %truncate_id(entry.id()),
			state = %order.state,
			"Order deactivated"
		);
		Ok(())
	}

	pub fn get(&self, order_id: &str) -> Option<SharedOrder> {
		self.active.get(order_id).map(|entry| entry.clone())
	}

	pub fn contains(&self, order_id: &str) -> bool {
		self.active.contains_key(order_id)
	}

	/// Number of active orders.
	pub fn len(&self) -> usize {
		self.active.len()
	}

	pub fn is_empty(&self) -> bool {
		self.active.is_empty()
	}

	/// The list holding orders in `state`.
	pub fn list(&self, state: OrderState) -> Option<&OrderList> {
		self.lists.get(&state)
	}

	pub fn dependencies(&self) -> &OrderDependencies {
		&self.dependencies
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Active orders owned by another provider.
	pub fn remote_owned(&self, local_provider: &str) -> Vec<SharedOrder> {
		self.active
			.iter()
			.filter(|entry| entry.value().is_provider_remote(local_provider))
			.map(|entry| entry.value().clone())
			.collect()
	}

	/// Ids of the members of every non-empty list, in list order.
	pub fn membership(&self) -> BTreeMap<OrderState, Vec<OrderId>> {
		self.lists
			.iter()
			.filter(|(_, list)| !list.is_empty())
			.map(|(state, list)| {
				let ids = list
					.snapshot()
					.iter()
					.map(|entry| entry.id().to_string())
					.collect();
				(*state, ids)
			})
			.collect()
	}
}

/// Registry built on first use.
///
/// Rehydration reads storage, so it is deferred until the first caller
/// asks for the registry. Concurrent first callers share one load.
pub struct LazyRegistry {
	storage: Arc<StorageService>,
	cell: OnceCell<Arc<OrderRegistry>>,
}

impl LazyRegistry {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			cell: OnceCell::new(),
		}
	}

	pub async fn get(&self) -> Result<Arc<OrderRegistry>, RegistryError> {
		self.cell
			.get_or_try_init(|| async {
				OrderRegistry::load(self.storage.clone()).await.map(Arc::new)
			})
			.await
			.cloned()
	}

	pub fn is_loaded(&self) -> bool {
		self.cell.initialized()
	}
}
