//! CLOSED processor.

use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Evicts orders that were moved into the CLOSED list.
///
/// Orders closed through the coordinator never reach this list; it only
/// holds orders another component transitioned to CLOSED directly.
pub struct ClosedProcessor {
	ctx: ProcessorContext,
}

impl ClosedProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for ClosedProcessor {
	fn name(&self) -> &'static str {
		"closed-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Closed
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		let order = entry.lock().await;
		if order.state != OrderState::Closed {
			return Ok(());
		}
		self.ctx.coordinator.evict_closed(entry, &order)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connector::MockCloudConnector;
	use crate::test_support::{context, local_compute, order_in_state, MockTransport};

	#[tokio::test]
	async fn test_closed_orders_are_evicted() {
		let ctx = context(MockCloudConnector::new(), MockTransport::new());
		let entry = order_in_state(&ctx, local_compute("a"), OrderState::Closed).await;
		assert!(ctx.registry.contains("a"));

		ClosedProcessor::new(ctx.clone()).process(&entry).await.unwrap();
		assert!(!ctx.registry.contains("a"));
		assert!(ctx.registry.list(OrderState::Closed).unwrap().is_empty());
	}
}
