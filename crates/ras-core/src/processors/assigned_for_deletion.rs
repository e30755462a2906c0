//! ASSIGNED_FOR_DELETION processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Issues the deletion call for orders marked for deletion.
///
/// Once the call succeeds, or there was nothing to delete, the order moves
/// to CHECKING_DELETION. A failed call is retried on the next pass.
pub struct AssignedForDeletionProcessor {
	ctx: ProcessorContext,
}

impl AssignedForDeletionProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for AssignedForDeletionProcessor {
	fn name(&self) -> &'static str {
		"assigned-for-deletion-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::AssignedForDeletion
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::AssignedForDeletion {
			return Ok(());
		}

		self.ctx.connector.delete_instance(&order).await?;
		self.ctx
			.coordinator
			.transition_locked(entry, &mut order, OrderState::CheckingDeletion)
			.await?;
		Ok(())
	}
}
