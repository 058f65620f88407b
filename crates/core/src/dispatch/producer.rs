//! Block puller feeding the fan-out loop.

use super::SYNC_INTERVAL;
use crate::DispatchError;
use chainscan_client::ChainClient;
use chainscan_types::BlockAndResult;
use derive_more::Constructor;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::warn;

/// Control messages from the fan-out loop to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProducerSignal {
    /// Stop pulling; a rollback is in progress.
    Pause,
    /// Resume pulling from `start`.
    Resume {
        /// First height to pull after the rollback, one past the common
        /// ancestor.
        start: u64,
    },
}

/// Pulls blocks from the chain and pushes them into the block channel.
///
/// Phase 1 streams the finalized range `[start_height, batch_to]`; phase 2
/// tails the tip one block at a time from `batch_to`, backing off 100 ms on
/// not-found and transient RPC errors. Transient errors never escape this
/// worker.
#[derive(Constructor)]
pub(crate) struct BlockProducer<C> {
    client: Arc<C>,
    block_tx: mpsc::Sender<BlockAndResult>,
    signal_rx: mpsc::Receiver<ProducerSignal>,
    start_height: u64,
    batch_to: u64,
}

impl<C: ChainClient> BlockProducer<C> {
    pub(crate) async fn run(mut self) -> Result<(), DispatchError> {
        if self.start_height < self.batch_to {
            self.catch_up().await?;
        }

        // The tip is re-pulled from batch_to itself; task cursors skip the
        // duplicate delivery when catch-up already covered it.
        let mut height = self.batch_to;
        loop {
            match self.signal_rx.try_recv() {
                Ok(ProducerSignal::Pause) => {
                    height = self.wait_for_resume().await?;
                    continue;
                }
                Ok(ProducerSignal::Resume { start }) => height = start,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Err(DispatchError::ChannelClosed),
            }
            match self.client.block_and_result(height).await {
                Ok(Some(block)) => {
                    self.send(block).await?;
                    height += 1;
                }
                Ok(None) => tokio::time::sleep(SYNC_INTERVAL).await,
                Err(err) => {
                    warn!(target: "chainscan::dispatch", height, %err, "Failed to pull block, retrying");
                    tokio::time::sleep(SYNC_INTERVAL).await;
                }
            }
        }
    }

    /// Streams the immutable range `[start_height, batch_to]` without reorg
    /// checks.
    async fn catch_up(&mut self) -> Result<(), DispatchError> {
        for height in self.start_height..=self.batch_to {
            let block = self.fetch_finalized(height).await;
            self.send(block).await?;
        }
        Ok(())
    }

    /// Retries until the finalized block materializes; it must exist.
    async fn fetch_finalized(&self, height: u64) -> BlockAndResult {
        loop {
            match self.client.block_and_result(height).await {
                Ok(Some(block)) => return block,
                Ok(None) => {}
                Err(err) => {
                    warn!(target: "chainscan::dispatch", height, %err, "Failed to pull finalized block, retrying");
                }
            }
            tokio::time::sleep(SYNC_INTERVAL).await;
        }
    }

    async fn wait_for_resume(&mut self) -> Result<u64, DispatchError> {
        loop {
            match self.signal_rx.recv().await {
                Some(ProducerSignal::Resume { start }) => return Ok(start),
                Some(ProducerSignal::Pause) => {}
                None => return Err(DispatchError::ChannelClosed),
            }
        }
    }

    async fn send(&self, block: BlockAndResult) -> Result<(), DispatchError> {
        self.block_tx.send(block).await.map_err(|_| DispatchError::ChannelClosed)
    }
}
