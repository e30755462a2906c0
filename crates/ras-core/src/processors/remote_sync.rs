//! Remote-sync processor.
//!
//! Keeps the local mirrors of forwarded orders in step with the owning
//! provider. Signals from the owner cover FULFILLED, the failure states and
//! CLOSED; this loop picks up everything else (STOPPED, RESUMING and so on)
//! and repairs mirrors whose signal was lost.

use super::{pause, LoopExit, ProcessorContext, ProcessorError};
use crate::orders::SharedOrder;
use ras_transport::{RemoteFailure, TransportError, TransportService};
use ras_types::{truncate_id, Order, OrderState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument;

/// Periodically copies the owner's view of each forwarded order.
pub struct RemoteSyncProcessor {
	ctx: ProcessorContext,
	transport: Arc<TransportService>,
}

/// Mirrors that are not synchronised.
fn skips(order: &Order) -> bool {
	order.failed_on_request
		|| matches!(
			order.state,
			OrderState::Open
				| OrderState::Selected
				| OrderState::FailedOnRequest
				| OrderState::AssignedForDeletion
				| OrderState::Closed
		)
}

impl RemoteSyncProcessor {
	pub fn new(ctx: ProcessorContext, transport: Arc<TransportService>) -> Self {
		Self { ctx, transport }
	}

	pub fn name(&self) -> &'static str {
		"remote-sync-proc"
	}

	/// Runs sync passes until shutdown or a defect.
	pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> LoopExit {
		loop {
			if let Err(e) = self.sync_once().await {
				tracing::error!(
					processor = self.name(),
					error = %e,
					"Registry inconsistency, stopping processor"
				);
				return LoopExit::Defect;
			}
			if !pause(interval, &mut shutdown).await {
				return LoopExit::Shutdown;
			}
		}
	}

	/// Synchronises every forwarded order once.
	///
	/// Only defects are returned; other failures are logged and retried on
	/// the next pass.
	pub async fn sync_once(&self) -> Result<(), ProcessorError> {
		for entry in self.ctx.registry.remote_owned(&self.ctx.local_provider) {
			match self.sync_order(&entry).await {
				Ok(()) => {},
				Err(e) if e.is_defect() => return Err(e),
				Err(e) => {
					tracing::warn!(
						order_id = %truncate_id(entry.id()),
						error = %e,
						"Failed to sync order"
					);
				},
			}
		}
		Ok(())
	}

	#[instrument(skip_all, fields(order_id = %truncate_id(entry.id())))]
	async fn sync_order(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
		// The owner may be waiting on this mirror's lock to deliver a signal,
		// so the remote read happens without holding it.
		let snapshot = entry.snapshot().await;
		if skips(&snapshot) {
			return Ok(());
		}

		let remote = match self.transport.get_remote_order(&snapshot).await {
			Ok(remote) => remote,
			Err(TransportError::Remote {
				failure: RemoteFailure::OrderNotFound(_),
				..
			}) => {
				tracing::info!("Owner no longer knows the order");
				return Ok(());
			},
			Err(e) => {
				tracing::debug!(error = %e, "Owner unreachable");
				return Ok(());
			},
		};

		let mut order = entry.lock().await;
		if skips(&order) || !self.ctx.registry.contains(entry.id()) {
			return Ok(());
		}

		match remote.state {
			// Not yet dispatched by the owner.
			OrderState::Open | OrderState::Selected => return Ok(()),
			OrderState::Closed => {
				self.ctx.coordinator.close_locked(entry, &mut order).await?;
				return Ok(());
			},
			_ => {},
		}

		if remote.instance_id.is_some() {
			order.instance_id = remote.instance_id.clone();
		}
		if remote.fault_message.is_some() {
			order.fault_message = remote.fault_message.clone();
		}
		if remote.state != order.state {
			self.ctx
				.coordinator
				.transition_locked(entry, &mut order, remote.state)
				.await?;
		}
		Ok(())
	}
}
