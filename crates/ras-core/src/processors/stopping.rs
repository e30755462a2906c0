//! STOPPING processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Waits for stop requests to take effect.
pub struct StoppingProcessor {
	ctx: ProcessorContext,
}

impl StoppingProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for StoppingProcessor {
	fn name(&self) -> &'static str {
		"stopping-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Stopping
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::Stopping {
			return Ok(());
		}

		let next = match self.ctx.connector.get_instance(&order).await {
			Ok(instance) if instance.is_stopped() => OrderState::Stopped,
			Ok(instance) if instance.has_failed() => {
				order.record_fault(
					instance
						.fault
						.unwrap_or_else(|| "instance failed while stopping".to_string()),
				);
				OrderState::FailedAfterSuccessfulRequest
			},
			Ok(_) => return Ok(()),
			Err(CloudError::InstanceNotFound) => {
				order.record_fault("instance disappeared while stopping");
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

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::test_support::{context, local_compute, order_in_state, MockTransport};
	use ras_types::{InstanceSnapshot, InstanceState};

	#[tokio::test]
	async fn test_stopped_instance_moves_to_stopped() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.returning(|_| Ok(InstanceSnapshot::new("i-a", InstanceState::Stopped)));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Stopping).await;

		StoppingProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Stopped);
	}

	#[tokio::test]
	async fn test_vanished_instance_fails_the_order() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.times(1)
			.returning(|_| Err(CloudError::InstanceNotFound));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Stopping).await;

		StoppingProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		let order = entry.snapshot().await;
		assert_eq!(order.state, OrderState::FailedAfterSuccessfulRequest);
		assert_eq!(
			order.fault_message.as_deref(),
			Some("instance disappeared while stopping")
		);
	}
}
