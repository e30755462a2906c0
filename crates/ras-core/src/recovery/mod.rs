//! Startup report on the rehydrated registry.
//!
//! Orders come back from storage in the state they were persisted in and
//! the processors pick them up from there. This module only summarises what
//! was restored so operators can see it in the logs.

use crate::orders::OrderRegistry;
use ras_types::{OrderId, OrderState};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// Summary of the orders restored at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Total number of active orders restored.
	pub total_orders: usize,
	/// Restored orders per state, non-empty states only.
	pub per_state: BTreeMap<OrderState, usize>,
	/// Orders restored as SELECTED. Unless an outcome was recorded, their
	/// resource request may or may not have reached the backend before the
	/// restart.
	pub selected_orders: Vec<OrderId>,
}

pub struct RecoveryService {
	registry: Arc<OrderRegistry>,
}

impl RecoveryService {
	pub fn new(registry: Arc<OrderRegistry>) -> Self {
		Self { registry }
	}

	/// Builds the report and logs it.
	#[instrument(skip_all)]
	pub fn report(&self) -> RecoveryReport {
		let membership = self.registry.membership();
		let mut report = RecoveryReport {
			total_orders: membership.values().map(Vec::len).sum(),
			..RecoveryReport::default()
		};
		for (state, ids) in membership {
			if state == OrderState::Selected {
				report.selected_orders = ids.clone();
			}
			report.per_state.insert(state, ids.len());
		}

		if report.total_orders == 0 {
			tracing::info!("No active orders to recover");
			return report;
		}
		for (state, count) in &report.per_state {
			tracing::info!(state = %state, count, "Recovered orders");
		}
		if !report.selected_orders.is_empty() {
			// Requests are never re-issued; only recorded outcomes are applied.
			tracing::warn!(
				count = report.selected_orders.len(),
				orders = ?report.selected_orders,
				"Orders were interrupted while their resource was being requested"
			);
		}
		tracing::info!(total_orders = report.total_orders, "Recovery complete");
		report
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::test_support::{context, local_compute, order_in_state, MockTransport};

	#[tokio::test]
	async fn test_empty_registry() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let report = RecoveryService::new(ctx.registry.clone()).report();
		assert_eq!(report, RecoveryReport::default());
	}

	#[tokio::test]
	async fn test_counts_per_state_and_flags_selected() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		order_in_state(&ctx, local_compute("a"), OrderState::Open).await;
		order_in_state(&ctx, local_compute("b"), OrderState::Spawning).await;
		order_in_state(&ctx, local_compute("c"), OrderState::Spawning).await;
		order_in_state(&ctx, local_compute("d"), OrderState::Selected).await;

		let report = RecoveryService::new(ctx.registry.clone()).report();
		assert_eq!(report.total_orders, 4);
		assert_eq!(report.per_state.get(&OrderState::Spawning), Some(&2));
		assert_eq!(report.per_state.get(&OrderState::Open), Some(&1));
		assert!(!report.per_state.contains_key(&OrderState::Fulfilled));
		assert_eq!(report.selected_orders, vec!["d".to_string()]);
	}
}
