//! Dependency bookkeeping between active orders.
//!
//! An attachment depends on the compute and volume it joins, for instance.
//! An order with live dependents cannot be deleted until they are closed.

use dashmap::DashMap;
use ras_types::{Order, OrderId};
use std::collections::BTreeSet;

/// Reverse index from an order to the active orders that depend on it.
#[derive(Debug, Default)]
pub struct OrderDependencies {
	dependents: DashMap<OrderId, BTreeSet<OrderId>>,
}

impl OrderDependencies {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records the order as a dependent of each of its dependencies.
	pub fn register(&self, order: &Order) {
		for dependency in &order.dependencies {
			self.dependents
				.entry(dependency.clone())
				.or_default()
				.insert(order.id.clone());
		}
	}

	/// Forgets the order as a dependent.
	pub fn release(&self, order: &Order) {
		for dependency in &order.dependencies {
			if let Some(mut dependents) = self.dependents.get_mut(dependency) {
				dependents.remove(&order.id);
			}
			self.dependents
				.remove_if(dependency, |_, dependents| dependents.is_empty());
		}
	}

	pub fn has_dependents(&self, order_id: &str) -> bool {
		self.dependents
			.get(order_id)
			.map(|dependents| !dependents.is_empty())
			.unwrap_or(false)
	}

	pub fn dependents(&self, order_id: &str) -> Vec<OrderId> {
		self.dependents
			.get(order_id)
			.map(|dependents| dependents.iter().cloned().collect())
			.unwrap_or_default()
	}
}
