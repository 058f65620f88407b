//! Derivation tasks and their runner.
//!
//! A task converts blocks into one projection of chain state. The
//! [`TaskRunner`] drives each task: one store transaction per block, the
//! task's writes and its `task_status` bump committed as one atomic unit, one
//! result signal per consumed message for the dispatcher's barrier.

use crate::{Config, DispatchError};
use async_trait::async_trait;
use chainscan_client::{ChainClient, ClientError};
use chainscan_storage::{StateStore, StorageError};
use chainscan_types::BlockAndResult;
use std::sync::Arc;
use thiserror::Error;

mod runner;
pub(crate) use runner::TaskRunner;

mod balance;
pub use balance::BalanceTask;

mod stat;
pub use stat::StatTask;

/// Errors raised while applying or reverting a block.
///
/// All of them are fatal to the worker and, by propagation, the process:
/// derivation must not silently skip blocks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A store operation inside the task transaction failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A chain RPC lookup needed for derivation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A debit would push a balance below zero. On a consistent chain this
    /// cannot happen; it signals a derivation bug or store corruption.
    #[error("balance of ({account}, asset {asset_id}) would go negative")]
    BalanceNotEnough {
        /// Account being debited.
        account: String,
        /// Asset being debited.
        asset_id: u64,
    },

    /// Receipts or internal traces do not line up with the block's
    /// transactions.
    #[error("receipts disagree with transactions at index {0}")]
    MalformedBlock(usize),

    /// An action payload failed to decode.
    #[error("action payload is malformed")]
    PayloadDecode(#[source] alloy_rlp::Error),

    /// Balance or counter arithmetic left the representable range.
    #[error("derived value left the representable range")]
    ArithmeticOverflow,
}

/// A derivation task.
///
/// `apply` and `revert` are pure functions of the block and the rows they
/// read: given the same starting store, `revert(b)` undoes exactly what
/// `apply(b)` did.
#[async_trait]
pub trait BlockTask<S: StateStore>: Send + Sync + std::fmt::Debug {
    /// Stable task name; keys the `task_status` row.
    fn name(&self) -> &'static str;

    /// Folds a block into the task's projection.
    async fn apply(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError>;

    /// Reverses the effect of a previously applied block.
    async fn revert(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError>;
}

/// Resolves the configured task names into implementations.
///
/// Fails with [`DispatchError::UnknownTask`] on the first name without a
/// registered implementation.
pub fn build_tasks<S, C>(
    config: &Config,
    client: Arc<C>,
) -> Result<Vec<Arc<dyn BlockTask<S>>>, DispatchError>
where
    S: StateStore,
    C: ChainClient,
{
    config
        .tasks
        .iter()
        .map(|name| match name.as_str() {
            "balance" => Ok(Arc::new(BalanceTask::new(
                client.clone(),
                config.chain_fee_account.clone(),
            )) as Arc<dyn BlockTask<S>>),
            "stat" => Ok(Arc::new(StatTask::new()) as Arc<dyn BlockTask<S>>),
            other => Err(DispatchError::UnknownTask(other.to_string())),
        })
        .collect()
}
