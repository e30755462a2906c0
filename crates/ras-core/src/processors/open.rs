//! OPEN processor: dispatches new orders.

use super::selected::complete_selection;
use super::{OrderProcessor, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use async_trait::async_trait;
use ras_types::{truncate_id, OrderState};
use tracing::instrument;

/// Claims each OPEN order and requests its resource.
///
/// The order is moved to SELECTED before the provisioning call so that a
/// restart never issues the same request twice. Local orders then move to
/// SPAWNING, or FAILED_ON_REQUEST if the cloud refused. Forwarded orders move
/// to PENDING either way; a failed forward is remembered in the order's
/// `failed_on_request` marker. If that last move fails, the SELECTED
/// processor retries it.
pub struct OpenProcessor {
	ctx: ProcessorContext,
}

impl OpenProcessor {
	pub fn new(ctx: ProcessorContext) -> Self {
		Self { ctx }
	}
}

#[async_trait]
impl OrderProcessor for OpenProcessor {
	fn name(&self) -> &'static str {
		"open-proc"
	}

	fn state(&self) -> OrderState {
		OrderState::Open
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		let mut order = entry.lock().await;
		if order.state != OrderState::Open {
			return Ok(());
		}

		let coordinator = &self.ctx.coordinator;
		coordinator
			.transition_locked(entry, &mut order, OrderState::Selected)
			.await?;

		let local = order.is_provider_local(&self.ctx.local_provider);
		let next = match self.ctx.connector.request_instance(&order).await {
			Ok(instance_id) => {
				if instance_id.is_some() {
					order.instance_id = instance_id;
				}
				if local {
					OrderState::Spawning
				} else {
					OrderState::Pending
				}
			},
			Err(e) => {
				tracing::warn!(error = %e, "Resource request failed");
				order.record_fault(e.to_string());
				if local {
					OrderState::FailedOnRequest
				} else {
					order.failed_on_request = true;
					OrderState::Pending
				}
			},
		};

		complete_selection(&self.ctx, entry, &mut order, next).await
	}
}
