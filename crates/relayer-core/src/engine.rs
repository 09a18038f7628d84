//! The relayer run loop.
//!
//! Subscribes to every contract topic, hands each inbound message to the
//! [`Dispatcher`] in its own task and purges the dedup cache on an interval.
//! The loop ends on the shutdown signal or when the dispatcher reports the
//! relayer balance is exhausted; either way subscriptions are torn down and
//! in-flight messages get `drain_timeout` to finish.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::CoreError;
use relayer_registry::ContractRegistry;
use relayer_storage::DedupCache;
use relayer_transport::TransportService;
use relayer_types::Address;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Why [`RelayerEngine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
	Shutdown,
	BalanceExhausted,
}

pub struct RelayerEngine {
	dispatcher: Arc<Dispatcher>,
	transport: Arc<TransportService>,
	contracts: Arc<ContractRegistry>,
	dedup: Arc<DedupCache>,
	purge_interval: Duration,
	drain_timeout: Duration,
}

type TaskResult = Result<Result<DispatchOutcome, CoreError>, JoinError>;

impl RelayerEngine {
	pub(crate) fn new(
		dispatcher: Arc<Dispatcher>,
		transport: Arc<TransportService>,
		contracts: Arc<ContractRegistry>,
		dedup: Arc<DedupCache>,
		purge_interval: Duration,
		drain_timeout: Duration,
	) -> Self {
		Self {
			dispatcher,
			transport,
			contracts,
			dedup,
			purge_interval,
			drain_timeout,
		}
	}

	pub fn relayer_address(&self) -> Address {
		self.dispatcher.relayer()
	}

	pub fn dispatcher(&self) -> &Arc<Dispatcher> {
		&self.dispatcher
	}

	pub fn contracts(&self) -> &ContractRegistry {
		&self.contracts
	}

	/// Serves requests until `shutdown` resolves or the balance floor is hit.
	pub async fn run<F>(&self, shutdown: F) -> Result<ExitReason, CoreError>
	where
		F: Future<Output = ()>,
	{
		let (message_tx, mut message_rx) = mpsc::unbounded_channel();
		self.transport
			.subscribe(&self.contracts.topics(), message_tx)
			.await?;

		info!(
			relayer = %self.relayer_address(),
			contracts = self.contracts.len(),
			"Relayer started"
		);

		let mut tasks: JoinSet<Result<DispatchOutcome, CoreError>> = JoinSet::new();
		let mut purge = tokio::time::interval(self.purge_interval);
		purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		// The first tick completes immediately
		purge.tick().await;
		tokio::pin!(shutdown);

		let reason = loop {
			tokio::select! {
				_ = &mut shutdown => {
					info!("Shutdown requested");
					break ExitReason::Shutdown;
				}
				message = message_rx.recv() => match message {
					Some(message) => {
						let dispatcher = self.dispatcher.clone();
						tasks.spawn(async move { dispatcher.handle(message).await });
					}
					None => {
						warn!("Transport closed the message channel");
						break ExitReason::Shutdown;
					}
				},
				Some(finished) = tasks.join_next() => {
					if Self::record(finished) == Some(DispatchOutcome::Halted) {
						break ExitReason::BalanceExhausted;
					}
				}
				_ = purge.tick() => {
					if let Err(e) = self.dedup.purge_expired().await {
						warn!(error = %e, "Failed to purge dedup cache");
					}
				}
			}
		};

		if let Err(e) = self.transport.unsubscribe_all().await {
			error!(error = %e, "Failed to unsubscribe");
		}
		self.drain(&mut tasks).await;

		info!(reason = ?reason, "Relayer stopped");
		Ok(reason)
	}

	/// Waits for in-flight messages, aborting whatever is left after
	/// `drain_timeout`.
	async fn drain(&self, tasks: &mut JoinSet<Result<DispatchOutcome, CoreError>>) {
		if tasks.is_empty() {
			return;
		}

		debug!(in_flight = tasks.len(), "Draining in-flight requests");
		let drained = tokio::time::timeout(self.drain_timeout, async {
			while let Some(finished) = tasks.join_next().await {
				Self::record(finished);
			}
		})
		.await;

		if drained.is_err() {
			warn!(aborted = tasks.len(), "Drain timed out, aborting in-flight requests");
			tasks.abort_all();
		}
	}

	/// Logs a finished task and returns its outcome, if it produced one.
	fn record(finished: TaskResult) -> Option<DispatchOutcome> {
		match finished {
			Ok(Ok(outcome)) => Some(outcome),
			Ok(Err(e)) => {
				error!(error = %e, "Failed to process message");
				None
			}
			Err(e) => {
				error!(error = %e, "Message task failed");
				None
			}
		}
	}
}
