//! State processors.
//!
//! Each processor owns one registry state. It repeatedly walks that state's
//! list, locks each order, re-checks that the order is still in the state
//! (it may have moved since it was handed out) and decides the next
//! transition. After a full pass it sleeps for its configured interval.
//!
//! Errors from cloud, transport or storage calls leave the order where it
//! is to be retried on the next pass. Errors that mean the registry is
//! inconsistent stop the processor.

use crate::connector::CloudConnector;
use crate::orders::{OrderRegistry, RegistryError, SharedOrder};
use crate::state::{StateCoordinator, TransitionError};
use async_trait::async_trait;
use ras_cloud::CloudError;
use ras_types::{truncate_id, OrderState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

mod assigned_for_deletion;
mod checking_deletion;
mod closed;
mod deleting;
mod failed;
mod fulfilled;
mod open;
mod remote_sync;
mod resuming;
mod selected;
mod spawning;
mod stopping;
mod unable_to_check_status;

pub use assigned_for_deletion::AssignedForDeletionProcessor;
pub use checking_deletion::CheckingDeletionProcessor;
pub use closed::ClosedProcessor;
pub use deleting::DeletingProcessor;
pub use failed::FailedProcessor;
pub use fulfilled::FulfilledProcessor;
pub use open::OpenProcessor;
pub use remote_sync::RemoteSyncProcessor;
pub use resuming::ResumingProcessor;
pub use selected::SelectedProcessor;
pub use spawning::SpawningProcessor;
pub use stopping::StoppingProcessor;
pub use unable_to_check_status::UnableToCheckStatusProcessor;

/// Errors raised while processing a single order.
#[derive(Debug, Error)]
pub enum ProcessorError {
	#[error("Cloud error: {0}")]
	Cloud(#[from] CloudError),
	#[error("Transition error: {0}")]
	Transition(#[from] TransitionError),
	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),
}

impl ProcessorError {
	/// True if the processor must stop instead of retrying.
	pub fn is_defect(&self) -> bool {
		match self {
			ProcessorError::Cloud(_) => false,
			ProcessorError::Transition(e) => e.is_defect(),
			ProcessorError::Registry(e) => e.is_defect(),
		}
	}
}

/// Services shared by every processor.
#[derive(Clone)]
pub struct ProcessorContext {
	pub registry: Arc<OrderRegistry>,
	pub coordinator: Arc<StateCoordinator>,
	pub connector: Arc<dyn CloudConnector>,
	pub local_provider: String,
}

impl ProcessorContext {
	/// True if the order is executed by this provider.
	pub fn owns(&self, entry: &SharedOrder) -> bool {
		entry.provider() == self.local_provider
	}
}

/// Handles orders in a single state.
#[async_trait]
pub trait OrderProcessor: Send + Sync {
	/// Task name, used in logs.
	fn name(&self) -> &'static str;

	/// State whose list this processor walks.
	fn state(&self) -> OrderState;

	/// Processes one order handed out by the list.
	///
	/// Implementations lock the order and return without doing anything if
	/// it has left `state()` in the meantime.
	async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError>;
}

/// Why a processor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
	Shutdown,
	Defect,
}

/// Waits for `interval` or until shutdown is requested.
///
/// Returns false when the loop must end. A dropped sender counts as a
/// shutdown request.
pub(crate) async fn pause(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
	if *shutdown.borrow() {
		return false;
	}
	tokio::select! {
		_ = tokio::time::sleep(interval) => true,
		changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
	}
}

/// Drives a processor over its state list until shutdown or a defect.
pub async fn run_processor(
	processor: Arc<dyn OrderProcessor>,
	registry: Arc<OrderRegistry>,
	interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) -> LoopExit {
	let state = processor.state();
	let Some(list) = registry.list(state) else {
		tracing::error!(processor = processor.name(), state = %state, "No list for state");
		return LoopExit::Defect;
	};
	tracing::debug!(processor = processor.name(), "Processor started");

	loop {
		if *shutdown.borrow() {
			return LoopExit::Shutdown;
		}

		let Some(entry) = list.get_next() else {
			list.reset_pointer();
			if !pause(interval, &mut shutdown).await {
				return LoopExit::Shutdown;
			}
			continue;
		};

		match processor.process(&entry).await {
			Ok(()) => {},
			Err(e) if e.is_defect() => {
				tracing::error!(
					processor = processor.name(),
					order_id = %truncate_id(entry.id()),
					error = %e,
					"Registry inconsistency, stopping processor"
				);
				return LoopExit::Defect;
			},
			Err(e) => {
				tracing::warn!(
					processor = processor.name(),
					order_id = %truncate_id(entry.id()),
					error = %e,
					"Failed to process order"
				);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::memory_storage;
	use ras_types::{Order, ResourceType};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingProcessor {
		seen: AtomicUsize,
		fail_with_defect: bool,
	}

	#[async_trait]
	impl OrderProcessor for CountingProcessor {
		fn name(&self) -> &'static str {
			"counting-proc"
		}

		fn state(&self) -> OrderState {
			OrderState::Open
		}

		async fn process(&self, entry: &SharedOrder) -> Result<(), ProcessorError> {
			self.seen.fetch_add(1, Ordering::SeqCst);
			if self.fail_with_defect {
				return Err(RegistryError::NotInList {
					id: entry.id().to_string(),
					state: OrderState::Open,
				}
				.into());
			}
			Err(CloudError::Backend("transient".to_string()).into())
		}
	}

	async fn registry_with_orders(n: usize) -> Arc<OrderRegistry> {
		let registry = Arc::new(OrderRegistry::new(memory_storage()));
		for i in 0..n {
			registry
				.activate_order(
					Order::new(ResourceType::Compute, "p1", "p1", "default")
						.with_id(format!("o{}", i)),
				)
				.await
				.unwrap();
		}
		registry
	}

	#[tokio::test]
	async fn test_transient_errors_are_retried_until_shutdown() {
		let registry = registry_with_orders(2).await;
		let processor = Arc::new(CountingProcessor {
			seen: AtomicUsize::new(0),
			fail_with_defect: false,
		});
		let (tx, rx) = watch::channel(false);

		let handle = tokio::spawn(run_processor(
			processor.clone(),
			registry,
			Duration::from_millis(5),
			rx,
		));
		tokio::time::sleep(Duration::from_millis(50)).await;
		tx.send(true).unwrap();

		assert_eq!(handle.await.unwrap(), LoopExit::Shutdown);
		assert!(processor.seen.load(Ordering::SeqCst) > 2);
	}

	#[tokio::test]
	async fn test_defect_stops_the_loop() {
		let registry = registry_with_orders(2).await;
		let processor = Arc::new(CountingProcessor {
			seen: AtomicUsize::new(0),
			fail_with_defect: true,
		});
		let (_tx, rx) = watch::channel(false);

		let exit = run_processor(processor.clone(), registry, Duration::from_millis(5), rx).await;
		assert_eq!(exit, LoopExit::Defect);
		assert_eq!(processor.seen.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_dropped_sender_ends_an_idle_loop() {
		let registry = registry_with_orders(0).await;
		let processor = Arc::new(CountingProcessor {
			seen: AtomicUsize::new(0),
			fail_with_defect: false,
		});
		let (tx, rx) = watch::channel(false);
		drop(tx);

		let exit = run_processor(processor, registry, Duration::from_secs(60), rx).await;
		assert_eq!(exit, LoopExit::Shutdown);
	}
}
