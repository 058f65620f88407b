//! The dispatch pipeline: producer, fan-out loop, task runners, and pruner
//! wired together.

use crate::{
    Config, DispatchError, Pruner,
    task::{TaskRunner, build_tasks},
};
use chainscan_client::ChainClient;
use chainscan_storage::{StateStore, TaskStatus};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::info;

mod producer;
use producer::BlockProducer;

mod fanout;
use fanout::BlockFanout;

/// Backoff between chain RPC retries and queue-drain polls.
pub(crate) const SYNC_INTERVAL: Duration = Duration::from_millis(100);

/// Cadence of the rollback-backup pruner.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Single-producer/multi-consumer orchestrator of the indexer.
///
/// Owns startup: resolves the configured tasks, loads (or creates) their
/// status rows, computes the common resume height, and spawns the pipeline
/// workers. Any worker error terminates [`Dispatcher::run`]; the process is
/// expected to be restarted by a supervisor and resumes from the last
/// committed heights.
#[derive(Debug)]
pub struct Dispatcher<S, C> {
    config: Config,
    store: Arc<S>,
    client: Arc<C>,
}

impl<S, C> Dispatcher<S, C>
where
    S: StateStore,
    C: ChainClient,
{
    /// Creates a new [`Dispatcher`].
    pub const fn new(config: Config, store: Arc<S>, client: Arc<C>) -> Self {
        Self { config, store, client }
    }

    /// Runs the pipeline until a worker fails.
    pub async fn run(self) -> Result<(), DispatchError> {
        let tasks = build_tasks::<S, C>(&self.config, self.client.clone())?;
        let statuses = self.load_task_statuses().await?;
        let start_height = statuses.values().map(|status| status.height).min().unwrap_or(0);

        let finalized = self.client.finalized_height().await?;
        let batch_to = finalized.max(start_height);

        let task_count = tasks.len();
        let (block_tx, block_rx) = mpsc::channel(self.config.block_chan_buffer.max(1));
        let (result_tx, result_rx) = mpsc::channel(task_count.max(1));
        let (signal_tx, signal_rx) = mpsc::channel(1);

        let mut workers: JoinSet<Result<(), DispatchError>> = JoinSet::new();

        let mut forward_txs = Vec::with_capacity(task_count);
        let mut rollback_txs = Vec::with_capacity(task_count);
        for task in tasks {
            let (forward_tx, forward_rx) = mpsc::channel(1);
            let (rollback_tx, rollback_rx) = mpsc::channel(1);
            forward_txs.push(forward_tx);
            rollback_txs.push(rollback_tx);
            let cursor = statuses.get(task.name()).map(|status| status.height).unwrap_or(0);
            let runner = TaskRunner::new(
                task,
                self.store.clone(),
                cursor,
                forward_rx,
                rollback_rx,
                result_tx.clone(),
            );
            workers.spawn(runner.run());
        }
        drop(result_tx);

        let fanout = BlockFanout::new(
            self.store.clone(),
            self.client.clone(),
            block_rx,
            forward_txs,
            rollback_txs,
            result_rx,
            signal_tx,
            batch_to,
            self.config.sync_log_interval,
        );
        workers.spawn(fanout.run());

        let pruner = Pruner::new(self.store.clone(), self.client.clone(), PRUNE_INTERVAL);
        workers.spawn(pruner.run());

        let producer = BlockProducer::new(
            self.client.clone(),
            block_tx,
            signal_rx,
            start_height,
            batch_to,
        );
        workers.spawn(producer.run());

        info!(
            target: "chainscan::dispatch",
            start_height,
            batch_to,
            task_count,
            "Dispatch pipeline started"
        );

        // Workers run forever; the first one to finish carries the fatal
        // error, and dropping the set aborts the rest.
        while let Some(joined) = workers.join_next().await {
            joined??;
        }
        Ok(())
    }

    /// Loads status rows for all configured tasks, creating missing ones at
    /// height zero.
    async fn load_task_statuses(&self) -> Result<HashMap<String, TaskStatus>, DispatchError> {
        let mut statuses = self.store.task_statuses(&self.config.tasks).await?;
        if statuses.len() != self.config.tasks.len() {
            for name in &self.config.tasks {
                if !statuses.contains_key(name) {
                    self.store.init_task_status(name).await?;
                }
            }
            statuses = self.store.task_statuses(&self.config.tasks).await?;
        }
        Ok(statuses)
    }
}
