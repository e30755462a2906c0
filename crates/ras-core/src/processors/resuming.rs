//! RESUMING processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Waits for resumed instances to become ready again.
pub struct ResumingProcessor {
	ctx: ProcessorContext,
}

impl ResumingProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for ResumingProcessor {
	fn name(&self) -> &'static str {
		"resuming-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Resuming
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::Resuming {
			return Ok(());
		}

		let next = match self.ctx.connector.get_instance(&order).await {
			Ok(instance) if instance.is_ready() => OrderState::Fulfilled,
			Ok(instance) if instance.has_failed() => {
				order.record_fault(
					instance
						.fault
						.unwrap_or_else(|| "instance failed while resuming".to_string()),
				);
				OrderState::FailedAfterSuccessfulRequest
			},
			Ok(_) => return Ok(()),
			Err(CloudError::InstanceNotFound) => {
				order.record_fault("instance disappeared while resuming");
				OrderState::FailedAfterSuccessfulRequest
			},
			Err(e) => return Err(e.into()),
		};

		self.ctx
			.coordinator
			.transition_locked(entry, &mut order, next)
			.await?;
		Ok(())
	}
}
