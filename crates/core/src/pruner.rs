//! Periodic sweep of backup rows that finality has made irreversible.

use crate::DispatchError;
use chainscan_client::ChainClient;
use chainscan_storage::StateStore;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tracing::debug;

/// Deletes rollback-backup account rows, reversible-cache rows, and
/// token-backup rows at or below the finalized height on a fixed cadence.
///
/// Failures are fatal: a broken store must stop the process, not rot
/// silently off the dispatcher's critical path.
#[derive(Debug)]
pub struct Pruner<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    period: Duration,
}

impl<S, C> Pruner<S, C>
where
    S: StateStore,
    C: ChainClient,
{
    /// Creates a new [`Pruner`] sweeping every `period`.
    pub const fn new(store: Arc<S>, client: Arc<C>, period: Duration) -> Self {
        Self { store, client, period }
    }

    /// Runs the sweep loop. The first sweep happens one full period after
    /// startup.
    pub async fn run(self) -> Result<(), DispatchError> {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        loop {
            ticker.tick().await;
            let finalized = self.client.finalized_height().await?;
            self.store.prune_rollback_accounts_until(finalized).await?;
            self.store.prune_reversible_until(finalized).await?;
            self.store.prune_token_backups_until(finalized).await?;
            debug!(target: "chainscan::pruner", finalized, "Pruned irreversible backup rows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainscan_client::{ChainClient, ClientError};
    use chainscan_storage::{BlockOriginal, MemStore};
    use chainscan_types::{AssetInfo, BlockAndResult};
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

    #[tokio::test]
    async fn prunes_rows_at_or_below_finalized() {
        let store = MemStore::new();
        for height in 100..=120 {
            store
                .add_reversible_block(&BlockOriginal {
                    height,
                    block_hash: Default::default(),
                    parent_hash: Default::default(),
                    block_data: vec![],
                })
                .await
                .expect("cache");
        }
        store.push_rollback_account(110);
        store.push_rollback_account(119);
        store.push_token_backup(115);
        store.push_token_backup(116);

        let mut client = MockClient::new();
        client.expect_finalized_height().returning(|| Ok(115));

        let pruner =
            Pruner::new(Arc::new(store.clone()), Arc::new(client), Duration::from_millis(10));
        let handle = tokio::spawn(pruner.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.reversible_heights(), (116..=120).collect::<Vec<_>>());
        assert_eq!(store.rollback_account_heights(), vec![119]);
        assert_eq!(store.token_backup_heights(), vec![116]);
    }
}
