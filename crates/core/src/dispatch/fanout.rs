//! Fan-out loop: reorg detection, reversible caching, the per-block barrier,
//! and the rollback procedure.

use super::{SYNC_INTERVAL, producer::ProducerSignal};
use crate::DispatchError;
use chainscan_client::ChainClient;
use chainscan_storage::{BlockOriginal, StateStore};
use chainscan_types::{BlockAndResult, decode_block, encode_block};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{info, warn};

/// Consumes the block channel and drives the derivation tasks in lock-step.
///
/// `current_block` always equals the last block fanned out to the tasks; an
/// arriving reversible block must either extend it by parent hash or trigger
/// [`BlockFanout::rollback`].
pub(crate) struct BlockFanout<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    block_rx: mpsc::Receiver<BlockAndResult>,
    forward_txs: Vec<mpsc::Sender<Arc<BlockAndResult>>>,
    rollback_txs: Vec<mpsc::Sender<Arc<BlockAndResult>>>,
    result_rx: mpsc::Receiver<()>,
    signal_tx: mpsc::Sender<ProducerSignal>,
    batch_to: u64,
    sync_log_interval: u64,
    current_block: Option<Arc<BlockAndResult>>,
}

impl<S, C> BlockFanout<S, C>
where
    S: StateStore,
    C: ChainClient,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<S>,
        client: Arc<C>,
        block_rx: mpsc::Receiver<BlockAndResult>,
        forward_txs: Vec<mpsc::Sender<Arc<BlockAndResult>>>,
        rollback_txs: Vec<mpsc::Sender<Arc<BlockAndResult>>>,
        result_rx: mpsc::Receiver<()>,
        signal_tx: mpsc::Sender<ProducerSignal>,
        batch_to: u64,
        sync_log_interval: u64,
    ) -> Self {
        Self {
            store,
            client,
            block_rx,
            forward_txs,
            rollback_txs,
            result_rx,
            signal_tx,
            batch_to,
            sync_log_interval,
            current_block: None,
        }
    }

    pub(crate) async fn run(mut self) -> Result<(), DispatchError> {
        while let Some(block) = self.block_rx.recv().await {
            let block = Arc::new(block);
            let height = block.height();

            if height > self.batch_to {
                if let Some(current) = self.current_block.take() {
                    if current.hash() != block.parent_hash() {
                        warn!(
                            target: "chainscan::dispatch",
                            height,
                            expected_parent = %current.hash(),
                            parent = %block.parent_hash(),
                            "Parent hash mismatch, reorg detected"
                        );
                        self.current_block = Some(block);
                        self.rollback(height).await?;
                        // The arriving block is discarded; the producer
                        // re-pulls it from the new start height.
                        continue;
                    }
                }
                self.current_block = Some(block.clone());
            }

            self.cache_reversible(&block).await?;
            self.fan_forward(block.clone()).await?;
            if self.sync_log_interval > 0 && height % self.sync_log_interval == 0 {
                info!(target: "chainscan::dispatch", height, "Committed block");
            }
        }
        Err(DispatchError::ChannelClosed)
    }

    /// Persists a reversible block before it is fanned out, re-confirming
    /// that finalization has not overtaken it in the meantime.
    async fn cache_reversible(&self, block: &BlockAndResult) -> Result<(), DispatchError> {
        if block.height() <= self.batch_to {
            return Ok(());
        }
        let finalized = self.client.finalized_height().await?;
        if block.height() > finalized {
            self.store
                .add_reversible_block(&BlockOriginal {
                    height: block.height(),
                    block_hash: block.hash(),
                    parent_hash: block.parent_hash(),
                    block_data: encode_block(block),
                })
                .await?;
        }
        Ok(())
    }

    async fn fan_forward(&mut self, block: Arc<BlockAndResult>) -> Result<(), DispatchError> {
        for sender in &self.forward_txs {
            sender.send(block.clone()).await.map_err(|_| DispatchError::ChannelClosed)?;
        }
        self.barrier().await
    }

    /// Waits for one result signal per task. The global commit fence: no
    /// block advances before every task has committed the previous one.
    async fn barrier(&mut self) -> Result<(), DispatchError> {
        for _ in 0..self.forward_txs.len() {
            self.result_rx.recv().await.ok_or(DispatchError::ChannelClosed)?;
        }
        Ok(())
    }

    /// Walks the reversible trail backwards until the stored projection
    /// rejoins the canonical chain, reverting each wrong-fork block in
    /// strictly decreasing height order.
    async fn rollback(&mut self, tip_height: u64) -> Result<(), DispatchError> {
        self.signal_tx.send(ProducerSignal::Pause).await.map_err(|_| DispatchError::ChannelClosed)?;

        // Drain blocks the producer already queued before it paused.
        loop {
            match self.block_rx.try_recv() {
                Ok(_) => tokio::time::sleep(SYNC_INTERVAL).await,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(DispatchError::ChannelClosed),
            }
        }

        let finalized = self.client.finalized_height().await?;
        let mut height = tip_height
            .checked_sub(1)
            .ok_or(DispatchError::RollbackPastFinalized { finalized })?;

        let ancestor = loop {
            match self.store.reversible_block_by_height(height).await? {
                Some(cached) => {
                    let chain_block = self
                        .client
                        .block_and_result(height)
                        .await?
                        .ok_or(DispatchError::MissingChainBlock(height))?;
                    if cached.block_hash == chain_block.hash() {
                        break chain_block;
                    }
                    if height <= finalized {
                        // A fork at or below finality contradicts the chain's
                        // finality guarantee.
                        return Err(DispatchError::RollbackPastFinalized { finalized });
                    }
                    let block = decode_block(&cached.block_data)
                        .map_err(|source| DispatchError::BlockDecode { height, source })?;
                    self.fan_rollback(Arc::new(block)).await?;
                    self.store.delete_reversible_from(cached.height).await?;
                    height -= 1;
                }
                None => {
                    if height > finalized {
                        return Err(DispatchError::ReversibleCacheGap(height));
                    }
                    // Finalized blocks cannot be on the wrong fork; the trail
                    // ends here.
                    break self
                        .client
                        .block_and_result(height)
                        .await?
                        .ok_or(DispatchError::MissingChainBlock(height))?;
                }
            }
        };

        let resume = ancestor.height() + 1;
        self.current_block = Some(Arc::new(ancestor));
        self.signal_tx
            .send(ProducerSignal::Resume { start: resume })
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;
        info!(target: "chainscan::dispatch", height = resume - 1, "Rollback complete");
        Ok(())
    }

    async fn fan_rollback(&mut self, block: Arc<BlockAndResult>) -> Result<(), DispatchError> {
        for sender in &self.rollback_txs {
            sender.send(block.clone()).await.map_err(|_| DispatchError::ChannelClosed)?;
        }
        self.barrier().await
    }
}
