//! Uniform driver for one derivation task.

use super::BlockTask;
use crate::DispatchError;
use chainscan_storage::{StateStore, StoreTx};
use chainscan_types::BlockAndResult;
use derive_more::Constructor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Drives one task against its forward and rollback channels.
///
/// The cursor starts at the task's persisted height. Forward blocks below the
/// cursor are skipped, which tolerates the dispatcher replaying blocks after
/// a reorg; rollbacks decrement the cursor first and only execute when the
/// block matches the decremented cursor, which guards against over- or
/// under-rolling. Every consumed message posts exactly one result signal.
#[derive(Constructor)]
pub(crate) struct TaskRunner<S: StateStore> {
    task: Arc<dyn BlockTask<S>>,
    store: Arc<S>,
    cursor: u64,
    forward_rx: mpsc::Receiver<Arc<BlockAndResult>>,
    rollback_rx: mpsc::Receiver<Arc<BlockAndResult>>,
    result_tx: mpsc::Sender<()>,
}

impl<S: StateStore> TaskRunner<S> {
    pub(crate) async fn run(mut self) -> Result<(), DispatchError> {
        loop {
            tokio::select! {
                maybe_block = self.forward_rx.recv() => {
                    let block = maybe_block.ok_or(DispatchError::ChannelClosed)?;
                    self.handle_forward(&block).await?;
                }
                maybe_block = self.rollback_rx.recv() => {
                    let block = maybe_block.ok_or(DispatchError::ChannelClosed)?;
                    self.handle_rollback(&block).await?;
                }
            }
            self.result_tx.send(()).await.map_err(|_| DispatchError::ChannelClosed)?;
        }
    }

    async fn handle_forward(&mut self, block: &BlockAndResult) -> Result<(), DispatchError> {
        let height = block.height();
        if height < self.cursor {
            debug!(
                target: "chainscan::task",
                task = self.task.name(),
                height,
                cursor = self.cursor,
                "Skipping already-committed block"
            );
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        self.task.apply(block, &mut tx).await.inspect_err(|err| {
            error!(
                target: "chainscan::task",
                task = self.task.name(),
                height,
                %err,
                "Failed to apply block"
            );
        })?;
        tx.set_task_height(self.task.name(), height).await?;
        tx.commit().await?;
        self.cursor += 1;
        Ok(())
    }

    async fn handle_rollback(&mut self, block: &BlockAndResult) -> Result<(), DispatchError> {
        let height = block.height();
        self.cursor = self.cursor.saturating_sub(1);
        if height != self.cursor {
            return Ok(());
        }
        let mut tx = self.store.begin().await?;
        self.task.revert(block, &mut tx).await.inspect_err(|err| {
            error!(
                target: "chainscan::task",
                task = self.task.name(),
                height,
                %err,
                "Failed to revert block"
            );
        })?;
        tx.set_task_height(self.task.name(), height.saturating_sub(1)).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::BalanceTask;
    use async_trait::async_trait;
    use chainscan_client::{ChainClient, ClientError};
    use chainscan_storage::MemStore;
    use chainscan_types::{AssetInfo, Block, BlockHeader};
    use mockall::mock;

    mock! {
        pub Client {}

        #[async_trait]
        impl ChainClient for Client {
            async fn block_and_result(
                &self,
                height: u64,
            ) -> Result<Option<BlockAndResult>, ClientError>;
            async fn finalized_height(&self) -> Result<u64, ClientError>;
            async fn asset_info_by_name(&self, name: &str) -> Result<AssetInfo, ClientError>;
        }
    }

    fn empty_block(height: u64) -> Arc<BlockAndResult> {
        Arc::new(BlockAndResult {
            block: Block {
                header: BlockHeader { number: height, ..Default::default() },
                txs: vec![],
            },
            receipts: vec![],
            detail_txs: vec![],
        })
    }

    fn spawn_runner(
        store: &MemStore,
        cursor: u64,
    ) -> (
        mpsc::Sender<Arc<BlockAndResult>>,
        mpsc::Sender<Arc<BlockAndResult>>,
        mpsc::Receiver<()>,
        tokio::task::JoinHandle<Result<(), DispatchError>>,
    ) {
        let task: Arc<dyn BlockTask<MemStore>> =
            Arc::new(BalanceTask::new(Arc::new(MockClient::new()), "chain.fee".to_string()));
        let (forward_tx, forward_rx) = mpsc::channel(1);
        let (rollback_tx, rollback_rx) = mpsc::channel(1);
        let (result_tx, result_rx) = mpsc::channel(1);
        let runner =
            TaskRunner::new(task, Arc::new(store.clone()), cursor, forward_rx, rollback_rx, result_tx);
        let handle = tokio::spawn(runner.run());
        (forward_tx, rollback_tx, result_rx, handle)
    }

    #[tokio::test]
    async fn applies_block_and_bumps_height() {
        let store = MemStore::new();
        store.init_task_status("balance").await.expect("init");
        let (forward_tx, _rollback_tx, mut result_rx, handle) = spawn_runner(&store, 0);

        forward_tx.send(empty_block(0)).await.expect("send");
        result_rx.recv().await.expect("result");
        assert_eq!(store.task_height("balance"), Some(0));
        handle.abort();
    }

    #[tokio::test]
    async fn skips_blocks_below_cursor_but_still_signals() {
        let store = MemStore::new();
        let (forward_tx, _rollback_tx, mut result_rx, handle) = spawn_runner(&store, 5);

        forward_tx.send(empty_block(3)).await.expect("send");
        result_rx.recv().await.expect("result");
        // No transaction ran, so the task row was never written.
        assert_eq!(store.task_height("balance"), None);
        handle.abort();
    }

    #[tokio::test]
    async fn rollback_requires_matching_height() {
        let store = MemStore::new();
        let (_forward_tx, rollback_tx, mut result_rx, handle) = spawn_runner(&store, 5);

        // Cursor decrements to 4; a block at height 2 must not revert.
        rollback_tx.send(empty_block(2)).await.expect("send");
        result_rx.recv().await.expect("result");
        assert_eq!(store.task_height("balance"), None);

        // Cursor decrements to 3; still no match.
        rollback_tx.send(empty_block(2)).await.expect("send");
        result_rx.recv().await.expect("result");
        assert_eq!(store.task_height("balance"), None);

        // Cursor decrements to 2; now the rollback executes and persists 1.
        rollback_tx.send(empty_block(2)).await.expect("send");
        result_rx.recv().await.expect("result");
        assert_eq!(store.task_height("balance"), Some(1));
        handle.abort();
    }
}
