//! In-memory implementation of the store traits.
//!
//! Backs the test suites of this crate and of `chainscan-core`. Transactions
//! read from a snapshot taken at `begin` (their own writes included) and
//! replay their write log onto the shared state at commit, so concurrently
//! committing tasks never clobber each other's rows and a dropped
//! transaction leaves no trace.

use crate::{
    AccountBalance, BlockOriginal, ChainStatus, ChainStatusUpdate, StateStore, StorageError,
    StoreTx, TaskStatus,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default, Clone)]
struct MemState {
    task_status: HashMap<String, u64>,
    chain_status: ChainStatus,
    balances: HashMap<(String, u64), AccountBalance>,
    reversible: BTreeMap<u64, BlockOriginal>,
    rollback_account_heights: Vec<u64>,
    token_backup_heights: Vec<u64>,
}

#[derive(Debug, Clone)]
enum WriteOp {
    SetTaskHeight(String, u64),
    UpdateChainStatus(ChainStatusUpdate),
    InsertBalance(AccountBalance),
    UpdateBalance(AccountBalance),
}

fn apply_op(state: &mut MemState, op: &WriteOp) {
    match op {
        WriteOp::SetTaskHeight(name, height) => {
            state.task_status.insert(name.clone(), *height);
        }
        WriteOp::UpdateChainStatus(update) => {
            let status = &mut state.chain_status;
            if let Some(height) = update.height {
                status.height = height;
            }
            if let Some(tx_count) = update.tx_count {
                status.tx_count = tx_count;
            }
            if let Some(producer_number) = update.producer_number {
                status.producer_number = producer_number;
            }
            if let Some(fee_income) = update.fee_income {
                status.fee_income = fee_income;
            }
            if let Some(token_income) = update.token_income {
                status.token_income = token_income;
            }
            if let Some(contract_income) = update.contract_income {
                status.contract_income = contract_income;
            }
        }
        WriteOp::InsertBalance(balance) | WriteOp::UpdateBalance(balance) => {
            state
                .balances
                .insert((balance.account.clone(), balance.asset_id), balance.clone());
        }
    }
}

/// Hash-map [`StateStore`] for tests.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    inner: Arc<Mutex<MemState>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds a balance row.
    pub fn set_balance(&self, account: &str, asset_id: u64, balance: U256) {
        self.lock().balances.insert(
            (account.to_string(), asset_id),
            AccountBalance {
                account: account.to_string(),
                asset_id,
                balance,
                updated_height: 0,
                updated_time: 0,
            },
        );
    }

    /// Seeds a rollback-backup account row at `height`.
    pub fn push_rollback_account(&self, height: u64) {
        self.lock().rollback_account_heights.push(height);
    }

    /// Seeds a token-backup row at `height`.
    pub fn push_token_backup(&self, height: u64) {
        self.lock().token_backup_heights.push(height);
    }

    /// Returns a task's committed height, if the task is registered.
    pub fn task_height(&self, name: &str) -> Option<u64> {
        self.lock().task_status.get(name).copied()
    }

    /// Returns the balance of `(account, asset_id)`, if the row exists.
    pub fn balance_of(&self, account: &str, asset_id: u64) -> Option<U256> {
        self.lock().balances.get(&(account.to_string(), asset_id)).map(|row| row.balance)
    }

    /// Returns a snapshot of all balance rows.
    pub fn balances(&self) -> Vec<AccountBalance> {
        let mut rows: Vec<_> = self.lock().balances.values().cloned().collect();
        rows.sort_by(|a, b| (&a.account, a.asset_id).cmp(&(&b.account, b.asset_id)));
        rows
    }

    /// Returns the chain-status row.
    pub fn chain_status_snapshot(&self) -> ChainStatus {
        self.lock().chain_status.clone()
    }

    /// Returns the cached reversible heights in ascending order.
    pub fn reversible_heights(&self) -> Vec<u64> {
        self.lock().reversible.keys().copied().collect()
    }

    /// Returns the seeded rollback-backup heights still present.
    pub fn rollback_account_heights(&self) -> Vec<u64> {
        self.lock().rollback_account_heights.clone()
    }

    /// Returns the seeded token-backup heights still present.
    pub fn token_backup_heights(&self) -> Vec<u64> {
        self.lock().token_backup_heights.clone()
    }
}

#[async_trait]
impl StateStore for MemStore {
    type Tx = MemStoreTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        Ok(MemStoreTx { snapshot: self.lock().clone(), ops: Vec::new(), store: self.clone() })
    }

    async fn task_statuses(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TaskStatus>, StorageError> {
        let state = self.lock();
        Ok(names
            .iter()
            .filter_map(|name| {
                state
                    .task_status
                    .get(name)
                    .map(|height| {
                        (name.clone(), TaskStatus { name: name.clone(), height: *height })
                    })
            })
            .collect())
    }

    async fn init_task_status(&self, name: &str) -> Result<(), StorageError> {
        self.lock().task_status.insert(name.to_string(), 0);
        Ok(())
    }

    async fn add_reversible_block(&self, block: &BlockOriginal) -> Result<(), StorageError> {
        self.lock().reversible.insert(block.height, block.clone());
        Ok(())
    }

    async fn reversible_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<BlockOriginal>, StorageError> {
        Ok(self.lock().reversible.get(&height).cloned())
    }

    async fn delete_reversible_from(&self, height: u64) -> Result<(), StorageError> {
        self.lock().reversible.retain(|h, _| *h < height);
        Ok(())
    }

    async fn prune_reversible_until(&self, height: u64) -> Result<(), StorageError> {
        self.lock().reversible.retain(|h, _| *h > height);
        Ok(())
    }

    async fn prune_rollback_accounts_until(&self, height: u64) -> Result<(), StorageError> {
        self.lock().rollback_account_heights.retain(|h| *h > height);
        Ok(())
    }

    async fn prune_token_backups_until(&self, height: u64) -> Result<(), StorageError> {
        self.lock().token_backup_heights.retain(|h| *h > height);
        Ok(())
    }
}

/// Transaction handle of [`MemStore`].
#[derive(Debug)]
pub struct MemStoreTx {
    snapshot: MemState,
    ops: Vec<WriteOp>,
    store: MemStore,
}

impl MemStoreTx {
    fn write(&mut self, op: WriteOp) {
        apply_op(&mut self.snapshot, &op);
        self.ops.push(op);
    }
}

#[async_trait]
impl StoreTx for MemStoreTx {
    async fn chain_status(&mut self) -> Result<ChainStatus, StorageError> {
        Ok(self.snapshot.chain_status.clone())
    }

    async fn update_chain_status(
        &mut self,
        update: &ChainStatusUpdate,
    ) -> Result<(), StorageError> {
        if update.is_empty() {
            return Err(StorageError::EmptyUpdate);
        }
        self.write(WriteOp::UpdateChainStatus(update.clone()));
        Ok(())
    }

    async fn account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
    ) -> Result<Option<AccountBalance>, StorageError> {
        Ok(self.snapshot.balances.get(&(account.to_string(), asset_id)).cloned())
    }

    async fn insert_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError> {
        self.write(WriteOp::InsertBalance(AccountBalance {
            account: account.to_string(),
            asset_id,
            balance,
            updated_height: height,
            updated_time: time,
        }));
        Ok(())
    }

    async fn update_account_balance(
        &mut self,
        account: &str,
        asset_id: u64,
        balance: U256,
        height: u64,
        time: u64,
    ) -> Result<(), StorageError> {
        if !self.snapshot.balances.contains_key(&(account.to_string(), asset_id)) {
            return Err(StorageError::EntryNotFound(format!(
                "account balance ({account}, {asset_id})"
            )));
        }
        self.write(WriteOp::UpdateBalance(AccountBalance {
            account: account.to_string(),
            asset_id,
            balance,
            updated_height: height,
            updated_time: time,
        }));
        Ok(())
    }

    async fn set_task_height(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        self.write(WriteOp::SetTaskHeight(name.to_string(), height));
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let mut state = self.store.lock();
        for op in &self.ops {
            apply_op(&mut state, op);
        }
        Ok(())
    }
}
