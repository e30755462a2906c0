//! SELECTED processor: finishes dispatches whose last transition failed.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_types::{truncate_id, Order, OrderState};
use tracing::instrument;

/// Moves a SELECTED order to the state its answered resource request
/// decided.
///
/// The outcome is kept on the order until the move succeeds, so the move
/// can be retried (for example when the requester could not be notified)
/// without asking the backend again. Orders without a recorded outcome were
/// interrupted before the answer arrived and are left alone.
pub struct SelectedProcessor {
	ctx: ProcessorContext,
}

impl SelectedProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for SelectedProcessor {
	fn name(&self) -> &'static str {
		"selected-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Selected
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		let mut order = entry.lock().await;
		if order.state != OrderState::Selected {
			return Ok(());
		}
		let Some(next) = order.selection_outcome else {
			return Ok(());
		};
		complete_selection(&self.ctx, entry, &mut order, next).await
	}
}

/// Moves a SELECTED order to `next`.
///
/// On failure the outcome is recorded on the order and persisted, and the
/// order stays SELECTED.
pub(super) async fn complete_selection(
	ctx: &ProcessorContext,
	entry: &SharedOrder,
	order: &mut Order,
	next: OrderState,
) -> Result<(), ProcessorError> {
	order.selection_outcome = None;
	match ctx.coordinator.transition_locked(entry, order, next).await {
		Ok(()) => Ok(()),
		Err(e) => {
			order.selection_outcome = Some(next);
			if let Err(save_error) = ctx.registry.storage().save_order(order).await {
				tracing::warn!(
					error = %save_error,
					"Failed to persist the outcome of the resource request"
				);
			}
			Err(e.into())
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::test_support::{context, local_compute, order_in_state, MockTransport};

	#[tokio::test]
	async fn test_recorded_outcome_is_applied() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Selected).await;
		entry.lock().await.selection_outcome = Some(OrderState::Spawning);

		SelectedProcessor::new(ctx.clone())
			.process(&entry)
			.await
			.unwrap();

		let order = entry.snapshot().await;
		assert_eq!(order.state, OrderState::Spawning);
		assert_eq!(order.selection_outcome, None);
		assert!(ctx.registry.list(OrderState::Spawning).unwrap().contains(&entry));
	}

	#[tokio::test]
	async fn test_order_without_outcome_is_left_selected() {
		// No expectation set: any connector call would panic.
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Selected).await;

		SelectedProcessor::new(ctx.clone())
			.process(&entry)
			.await
			.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Selected);
	}
}
