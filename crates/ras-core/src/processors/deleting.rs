//! DELETING processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Follows deletions issued directly by a federation request.
///
/// The order is closed once its instance is gone. If the instance failed
/// instead of disappearing, the order goes back to ASSIGNED_FOR_DELETION so
/// the deletion is issued again.
pub struct DeletingProcessor {
	ctx: ProcessorContext,
}

impl DeletingProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for DeletingProcessor {
	fn name(&self) -> &'static str {
		"deleting-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Deleting
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::Deleting {
			return Ok(());
		}

		let coordinator = &self.ctx.coordinator;
		match self.ctx.connector.get_instance(&order).await {
			Err(CloudError::InstanceNotFound) => coordinator.close_locked(entry, &mut order).await?,
			Ok(instance) if instance.has_failed() => {
				coordinator
					.transition_locked(entry, &mut order, OrderState::AssignedForDeletion)
					.await?
			},
			Ok(_) => {},
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
	async fn test_gone_instance_closes_the_order() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.returning(|_| Err(CloudError::InstanceNotFound));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Deleting).await;

		DeletingProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert!(!ctx.registry.contains("a"));
		assert_eq!(entry.snapshot().await.state, OrderState::Closed);
	}

	#[tokio::test]
	async fn test_failed_instance_is_reassigned_for_deletion() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.returning(|_| Ok(InstanceSnapshot::new("i-a", InstanceState::Failed)));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Deleting).await;

		DeletingProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::AssignedForDeletion);
	}
}
