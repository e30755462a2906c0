//! UNABLE_TO_CHECK_STATUS processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Retries instances whose status could not be read.
///
/// READY moves the order to FULFILLED, a failed or vanished instance to
/// FAILED_AFTER_SUCCESSFUL_REQUEST. Another failed query only updates the
/// fault message.
pub struct UnableToCheckStatusProcessor {
	ctx: ProcessorContext,
}

impl UnableToCheckStatusProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for UnableToCheckStatusProcessor {
	fn name(&self) -> &'static str {
		"unable-to-check-status-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::UnableToCheckStatus
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::UnableToCheckStatus {
			return Ok(());
		}

		let next = match self.ctx.connector.get_instance(&order).await {
			Ok(instance) if instance.is_ready() => OrderState::Fulfilled,
			Ok(instance) if instance.has_failed() => OrderState::FailedAfterSuccessfulRequest,
			Ok(_) => return Ok(()),
			Err(CloudError::InstanceNotFound) => {
				order.record_fault("instance not found");
				OrderState::FailedAfterSuccessfulRequest
			},
			Err(e) => {
				order.record_fault(e.to_string());
				return Err(e.into());
			},
		};

		self.ctx
			.coordinator
			.transition_locked(entry, &mut order, next)
			.await?;
		Ok(())
	}
}
