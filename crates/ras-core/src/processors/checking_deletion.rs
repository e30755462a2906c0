//! CHECKING_DELETION processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Closes orders whose instance is confirmed gone.
pub struct CheckingDeletionProcessor {
	ctx: ProcessorContext,
}

impl CheckingDeletionProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for CheckingDeletionProcessor {
	fn name(&self) -> &'static str {
		"checking-deletion-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::CheckingDeletion
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::CheckingDeletion {
			return Ok(());
		}

		match self.ctx.connector.get_instance(&order).await {
			Err(CloudError::InstanceNotFound) => {
				self.ctx.coordinator.close_locked(entry, &mut order).await?;
			},
			Ok(instance) => {
				tracing::debug!(state = %instance.state, "Instance still present");
			},
			Err(e) => return Err(e.into()),
		}
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
	async fn test_closes_only_when_instance_is_gone() {
		let mut connector = MockCloudConnector::new();
		let mut answers = vec![
			Err(CloudError::InstanceNotFound),
			Ok(InstanceSnapshot::new("i-a", InstanceState::Deleting)),
		];
		connector
			.expect_get_instance()
			.times(2)
			.returning(move |_| answers.pop().unwrap_or(Err(CloudError::InstanceNotFound)));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::CheckingDeletion).await;
		let processor = CheckingDeletionProcessor::new(ctx.clone());

		processor.process(&entry).await.unwrap();
		assert!(ctx.registry.contains("a"));

		processor.process(&entry).await.unwrap();
		assert!(!ctx.registry.contains("a"));
		assert!(ctx.registry.membership().is_empty());
	}
}
