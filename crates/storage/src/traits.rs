use crate::{
    AccountBalance, BlockOriginal, ChainStatus, ChainStatusUpdate, StorageError, TaskStatus,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::HashMap;

/// Pool-level access to the indexer store.
///
/// Per-block mutations go through [`StateStore::begin`] and the returned
/// [`StoreTx`]; everything here either runs before the pipeline starts or is
/// a single-statement operation that needs no surrounding transaction.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// The per-block transaction handle.
    type Tx: StoreTx;

    /// Opens a new store transaction.
    async fn begin(&self) -> Result<Self::Tx, StorageError>;

    /// Loads the status rows for the given task names. Missing tasks are
    /// absent from the returned map.
    async fn task_statuses(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TaskStatus>, StorageError>;

    /// Creates a zero-height status row for `name`.
    async fn init_task_status(&self, name: &str) -> Result<(), StorageError>;

    /// Inserts a block into the reversible block cache.
    async fn add_reversible_block(&self, block: &BlockOriginal) -> Result<(), StorageError>;

    /// Fetches the cached reversible block at `height`, if any.
    async fn reversible_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<BlockOriginal>, StorageError>;

    /// Deletes all cached reversible blocks with height ≥ `height`.
    async fn delete_reversible_from(&self, height: u64) -> Result<(), StorageError>;

    /// Deletes all cached reversible blocks with height ≤ `height`.
    async fn prune_reversible_until(&self, height: u64) -> Result<(), StorageError>;

    /// Deletes rollback-backup account rows with height ≤ `height`.
    async fn prune_rollback_accounts_until(&self, height: u64) -> Result<(), StorageError>;

    /// Deletes token-backup rows with height ≤ `height`.
    async fn prune_token_backups_until(&self, height: u64) -> Result<(), StorageError>;
}

/// One atomic unit of derived-state mutation.
///
/// A task applies (or reverts) a block entirely inside one [`StoreTx`] and
/// bumps its `task_status` row through [`StoreTx::set_task_height`] before
/// committing, so replay after a crash always resumes from a consistent
/// height.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads the chain-status row.
    async fn chain_status(&mut self) -> Result<ChainStatus, StorageError>;

    /// Writes the populated columns of `update` to the chain-status row.
    async fn update_chain_status(
        &mut self,
        update: &ChainStatusUpdate,
    ) -> Result<(), StorageError>;

    /// Reads the balance row of `(account, asset_id)`, if present.
    async fn account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
    ) -> Result<Option<AccountBalance>, StorageError>;

    /// Inserts a fresh balance row.
    async fn insert_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError>;

    /// Overwrites an existing balance row.
    async fn update_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError>;

    /// Sets the task's committed height.
    async fn set_task_height(&mut self, name: &str, height: u64) -> Result<(), StorageError>;

    /// Commits the transaction.
    async fn commit(self) -> Result<(), StorageError>
    where
        Self: Sized;
}
