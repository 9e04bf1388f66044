//! Scheduled expiry sweeps driven by a tokio task.

use crate::{
    config::StoreConfig,
    error::StoreError,
    storage::GroupStorage,
    store::{MessageGroupStore, SweepReport},
    types::CorrelationKey,
};
use eyre::{Result, WrapErr};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, trace};

/// The result of one scheduled sweep.
pub type SweepOutcome = Result<SweepReport, StoreError>;

/// Number of undelivered outcomes kept before new ones are dropped.
const OUTCOME_CAPACITY: usize = 16;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
enum ReaperCommand {
    Sweep,
    Shutdown,
}

/// Periodically expires groups of a shared store.
///
/// Every `reap_interval` the reaper calls
/// [expire_message_groups](MessageGroupStore::expire_message_groups) with
/// `expiry_timeout` on the blocking thread pool, since callbacks may block.
/// Outcomes are published on the returned channel.
#[derive(Debug)]
pub struct Reaper {
    interval: Duration,
    timeout_millis: i64,
}

impl Reaper {
    /// A zero `interval` is raised to one millisecond.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            timeout_millis: i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            interval: config.reap_interval.max(MIN_INTERVAL),
            timeout_millis: config.expiry_timeout_millis(),
        }
    }

    /// Start sweeping `store` on the current tokio runtime.
    ///
    /// Dropping the returned handle stops the reaper after the running
    /// sweep, if any, has finished.
    pub fn spawn<K, T, S>(
        self,
        store: Arc<MessageGroupStore<K, T, S>>,
    ) -> (ReaperHandle, flume::Receiver<SweepOutcome>)
    where
        K: CorrelationKey,
        T: Send + Sync + 'static,
        S: GroupStorage<K, T> + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = flume::bounded(OUTCOME_CAPACITY);
        let handle = tokio::spawn(self.run(store, command_rx, outcome_tx));

        (ReaperHandle { command_tx, handle }, outcome_rx)
    }

    async fn run<K, T, S>(
        self,
        store: Arc<MessageGroupStore<K, T, S>>,
        mut command_rx: mpsc::UnboundedReceiver<ReaperCommand>,
        outcome_tx: flume::Sender<SweepOutcome>,
    ) where
        K: CorrelationKey,
        T: Send + Sync + 'static,
        S: GroupStorage<K, T> + 'static,
    {
        let Self {
            interval,
            timeout_millis,
        } = self;

        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?interval, timeout_millis, "reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(ReaperCommand::Sweep) => {}
                        Some(ReaperCommand::Shutdown) | None => break,
                    }
                }
            }

            let store = store.clone();
            let outcome =
                match tokio::task::spawn_blocking(move || store.expire_message_groups(timeout_millis))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!("expiry sweep task failed: {err}");
                        continue;
                    }
                };

            if let Err(err) = outcome_tx.try_send(outcome) {
                trace!("dropping sweep outcome: {err}");
            }
        }

        debug!("reaper stopped");
    }
}

/// Controls a running [Reaper].
#[derive(Debug)]
pub struct ReaperHandle {
    command_tx: mpsc::UnboundedSender<ReaperCommand>,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    /// Request a sweep without waiting for the next tick. Returns false if
    /// the reaper has stopped.
    pub fn trigger(&self) -> bool {
        self.command_tx.send(ReaperCommand::Sweep).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the reaper and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.command_tx.send(ReaperCommand::Shutdown);
        self.handle.await.wrap_err("reaper task failed")
    }
}
