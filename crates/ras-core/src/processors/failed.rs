//! FAILED_AFTER_SUCCESSFUL_REQUEST processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Detects instances that recovered on their own.
///
/// A READY instance moves the order back to FULFILLED. When the instance
/// cannot be queried at all the order moves to UNABLE_TO_CHECK_STATUS.
pub struct FailedProcessor {
	ctx: ProcessorContext,
}

impl FailedProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for FailedProcessor {
	fn name(&self) -> &'static str {
		"failed-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::FailedAfterSuccessfulRequest
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		if !self.ctx.owns(entry) {
			return Ok(());
		}
		let mut order = entry.lock().await;
		if order.state != OrderState::FailedAfterSuccessfulRequest {
			return Ok(());
		}

		let next = match self.ctx.connector.get_instance(&order).await {
			Ok(instance) if instance.is_ready() => OrderState::Fulfilled,
			Ok(_) | Err(CloudError::InstanceNotFound) => return Ok(()),
			Err(e) => {
				order.record_fault(e.to_string());
				OrderState::UnableToCheckStatus
			},
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
	async fn test_recovered_instance_is_fulfilled_again() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.returning(|_| Ok(InstanceSnapshot::new("i-a", InstanceState::Ready)));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(
			&ctx,
			local_compute("a"),
			OrderState::FailedAfterSuccessfulRequest,
		)
		.await;

		FailedProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::Fulfilled);
	}

	#[tokio::test]
	async fn test_query_failure_moves_to_unable_to_check() {
		let mut connector = MockCloudConnector::new();
		connector
			.expect_get_instance()
			.returning(|_| Err(CloudError::Backend("api down".to_string())));
		let ctx = context(connector, MockTransport::new());
		let entry = order_in_state(
			&ctx,
			local_compute("a"),
			OrderState::FailedAfterSuccessfulRequest,
		)
		.await;

		FailedProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert_eq!(entry.snapshot().await.state, OrderState::UnableToCheckStatus);
	}
}
