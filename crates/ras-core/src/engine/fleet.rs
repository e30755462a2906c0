//! Processor fleet.
//!
//! Starts one task per state processor plus the remote-sync task, and stops
//! them together through a shared shutdown signal.

use crate::processors::{
	run_processor, AssignedForDeletionProcessor, CheckingDeletionProcessor, ClosedProcessor,
	DeletingProcessor, FailedProcessor, FulfilledProcessor, LoopExit, OpenProcessor,
	OrderProcessor, ProcessorContext, RemoteSyncProcessor, ResumingProcessor, SelectedProcessor,
	SpawningProcessor, StoppingProcessor, UnableToCheckStatusProcessor,
};
use parking_lot::Mutex;
use ras_config::ProcessorsConfig;
use ras_transport::TransportService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Running {
	shutdown: watch::Sender<bool>,
	tasks: Vec<(&'static str, JoinHandle<LoopExit>)>,
}

/// The set of processor tasks of one provider.
pub struct ProcessorFleet {
	ctx: ProcessorContext,
	transport: Arc<TransportService>,
	intervals: ProcessorsConfig,
	running: Mutex<Option<Running>>,
}

impl ProcessorFleet {
	pub fn new(
		ctx: ProcessorContext,
		transport: Arc<TransportService>,
		intervals: ProcessorsConfig,
	) -> Self {
		Self {
			ctx,
			transport,
			intervals,
			running: Mutex::new(None),
		}
	}

	fn processors(&self) -> Vec<(Arc<dyn OrderProcessor>, u64)> {
		let ctx = &self.ctx;
		let i = &self.intervals;
		vec![
			(Arc::new(OpenProcessor::new(ctx.clone())), i.open_ms),
			// Shares the OPEN cadence; it only finishes what OPEN started.
			(Arc::new(SelectedProcessor::new(ctx.clone())), i.open_ms),
			(Arc::new(SpawningProcessor::new(ctx.clone())), i.spawning_ms),
			(Arc::new(FulfilledProcessor::new(ctx.clone())), i.fulfilled_ms),
			(Arc::new(FailedProcessor::new(ctx.clone())), i.failed_ms),
			(Arc::new(StoppingProcessor::new(ctx.clone())), i.stopping_ms),
			(Arc::new(ResumingProcessor::new(ctx.clone())), i.resuming_ms),
			(
				Arc::new(UnableToCheckStatusProcessor::new(ctx.clone())),
				i.unable_to_check_status_ms,
			),
			(
				Arc::new(AssignedForDeletionProcessor::new(ctx.clone())),
				i.assigned_for_deletion_ms,
			),
			(Arc::new(DeletingProcessor::new(ctx.clone())), i.deleting_ms),
			(
				Arc::new(CheckingDeletionProcessor::new(ctx.clone())),
				i.checking_deletion_ms,
			),
			(Arc::new(ClosedProcessor::new(ctx.clone())), i.closed_ms),
		]
	}

	/// Starts every processor. Returns false if the fleet was already running.
	pub fn start(&self) -> bool {
		let mut running = self.running.lock();
		if running.is_some() {
			return false;
		}

		let (shutdown, receiver) = watch::channel(false);
		let mut tasks = Vec::new();
		for (processor, interval_ms) in self.processors() {
			let name = processor.name();
			let handle = tokio::spawn(run_processor(
				processor,
				self.ctx.registry.clone(),
				ProcessorsConfig::interval(interval_ms),
				receiver.clone(),
			));
			tasks.push((name, handle));
		}

		let sync = RemoteSyncProcessor::new(self.ctx.clone(), self.transport.clone());
		let interval = ProcessorsConfig::interval(self.intervals.remote_sync_ms);
		let sync_receiver = receiver.clone();
		tasks.push((
			sync.name(),
			tokio::spawn(async move { sync.run(interval, sync_receiver).await }),
		));

		tracing::info!(processors = tasks.len(), "Processor fleet started");
		*running = Some(Running { shutdown, tasks });
		true
	}

	/// Signals every processor to stop and waits for them.
	///
	/// Returns false if the fleet was not running.
	pub async fn stop(&self) -> bool {
		let Some(running) = self.running.lock().take() else {
			return false;
		};
		running.shutdown.send(true).ok();

		let (names, handles): (Vec<_>, Vec<_>) = running.tasks.into_iter().unzip();
		let results = futures::future::join_all(handles).await;
		for (name, result) in names.into_iter().zip(results) {
			match result {
				Ok(LoopExit::Shutdown) => {},
				Ok(LoopExit::Defect) => {
					tracing::warn!(processor = name, "Processor had stopped on a defect")
				},
				Err(e) => tracing::error!(processor = name, error = %e, "Processor task failed"),
			}
		}
		tracing::info!("Processor fleet stopped");
		true
	}

	pub fn is_running(&self) -> bool {
		self.running.lock().is_some()
	}

	/// Names of the processor tasks, in start order.
	pub fn task_names(&self) -> Vec<&'static str> {
		let mut names: Vec<&'static str> =
			self.processors().iter().map(|(p, _)| p.name()).collect();
		names.push("remote-sync-proc");
		names
	}
}
