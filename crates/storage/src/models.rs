//! Row models of the indexer store.

use alloy_primitives::{B256, U256};

/// Resume cursor of one derivation task.
///
/// `height` is the highest block the task has fully committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    /// Configured task name.
    pub name: String,
    /// Highest fully-committed block height.
    pub height: u64,
}

/// The single-row chain summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainStatus {
    /// Height of the last block folded into the summary.
    pub height: u64,
    /// Total transactions observed.
    pub tx_count: u64,
    /// Number of registered block producers.
    pub producer_number: u64,
    /// Cumulative fee income.
    pub fee_income: U256,
    /// Cumulative token income.
    pub token_income: U256,
    /// Cumulative contract income.
    pub contract_income: U256,
}

/// A partial update of the chain-status row.
///
/// Only the populated columns are written. Applying an update with no
/// populated column is a [`crate::StorageError::EmptyUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainStatusUpdate {
    /// New height, if changed.
    pub height: Option<u64>,
    /// New transaction count, if changed.
    pub tx_count: Option<u64>,
    /// New producer count, if changed.
    pub producer_number: Option<u64>,
    /// New cumulative fee income, if changed.
    pub fee_income: Option<U256>,
    /// New cumulative token income, if changed.
    pub token_income: Option<U256>,
    /// New cumulative contract income, if changed.
    pub contract_income: Option<U256>,
}

impl ChainStatusUpdate {
    /// Returns `true` when no column is populated.
    pub const fn is_empty(&self) -> bool {
        self.height.is_none()
            && self.tx_count.is_none()
            && self.producer_number.is_none()
            && self.fee_income.is_none()
            && self.token_income.is_none()
            && self.contract_income.is_none()
    }
}

/// Balance of one `(account, asset)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    /// Account name.
    pub account: String,
    /// Asset identifier.
    pub asset_id: u64,
    /// Current balance; never negative at commit time.
    pub balance: U256,
    /// Height of the block that last touched the balance.
    pub updated_height: u64,
    /// Timestamp of the block that last touched the balance.
    pub updated_time: u64,
}

/// One entry of the reversible block cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOriginal {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub block_hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// The full block, RLP-encoded.
    pub block_data: Vec<u8>,
}
