//! FULFILLED processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Watches ready instances.
///
/// An instance observed FAILED, or one that can no longer be queried, moves
/// the order to FAILED_AFTER_SUCCESSFUL_REQUEST.
pub struct FulfilledProcessor {
	ctx: ProcessorContext,
}

impl FulfilledProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for FulfilledProcessor {
	fn name(&self) -> &'static str {
		"fulfilled-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Fulfilled
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::Fulfilled {
			return Ok(());
		}

		match self.ctx.connector.get_instance(&order).await {
			Ok(instance) if instance.has_failed() => {
				order.record_fault(
					instance
						.fault
						.unwrap_or_else(|| format!("instance {} failed", instance.instance_id)),
				);
			},
			Ok(_) => return Ok(()),
			Err(e) => order.record_fault(e.to_string()),
		}

		self.ctx
			.coordinator
			.transition_locked(entry, &mut order, OrderState::FailedAfterSuccessfulRequest)
			.await?;
		Ok(())
	}
}
