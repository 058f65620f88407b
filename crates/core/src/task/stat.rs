//! Chain-level statistics derivation.

use super::{BlockTask, TaskError};
use alloy_primitives::U256;
use async_trait::async_trait;
use chainscan_storage::{ChainStatusUpdate, StateStore, StoreTx};
use chainscan_types::BlockAndResult;

/// Maintains the single-row chain summary: indexed height, transaction
/// count, and cumulative fee income.
#[derive(Debug, Default)]
pub struct StatTask;

impl StatTask {
    /// Creates a new [`StatTask`].
    pub const fn new() -> Self {
        Self
    }

    /// Total fees paid in the block. Genesis charges no fees.
    fn block_fees(data: &BlockAndResult) -> Result<U256, TaskError> {
        if data.block.header.number == 0 {
            return Ok(U256::ZERO);
        }
        let mut total = U256::ZERO;
        for (i, transaction) in data.block.txs.iter().enumerate() {
            let receipt = data.receipts.get(i).ok_or(TaskError::MalformedBlock(i))?;
            for result in &receipt.action_results {
                let fee = U256::from(result.gas_used) * U256::from(transaction.gas_price);
                total = total.checked_add(fee).ok_or(TaskError::ArithmeticOverflow)?;
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl<S: StateStore> BlockTask<S> for StatTask {
    fn name(&self) -> &'static str {
        "stat"
    }

    async fn apply(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError> {
        let status = tx.chain_status().await?;
        let fees = Self::block_fees(data)?;
        let tx_count = status
            .tx_count
            .checked_add(data.block.txs.len() as u64)
            .ok_or(TaskError::ArithmeticOverflow)?;
        let fee_income =
            status.fee_income.checked_add(fees).ok_or(TaskError::ArithmeticOverflow)?;
        tx.update_chain_status(&ChainStatusUpdate {
            height: Some(data.block.header.number),
            tx_count: Some(tx_count),
            fee_income: Some(fee_income),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    async fn revert(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError> {
        let status = tx.chain_status().await?;
        let fees = Self::block_fees(data)?;
        let tx_count = status
            .tx_count
            .checked_sub(data.block.txs.len() as u64)
            .ok_or(TaskError::ArithmeticOverflow)?;
        let fee_income =
            status.fee_income.checked_sub(fees).ok_or(TaskError::ArithmeticOverflow)?;
        tx.update_chain_status(&ChainStatusUpdate {
            height: Some(data.block.header.number.saturating_sub(1)),
            tx_count: Some(tx_count),
            fee_income: Some(fee_income),
            ..Default::default()
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainscan_storage::MemStore;
    use chainscan_types::{
        Action, ActionResult, ActionType, Block, BlockHeader, RECEIPT_STATUS_SUCCESSFUL,
        Receipt, Transaction,
    };
    use alloy_primitives::Bytes;

    fn block_with_fee(height: u64, gas_used: u64, gas_price: u64) -> BlockAndResult {
        BlockAndResult {
            block: Block {
                header: BlockHeader { number: height, time: 1_000, ..Default::default() },
                txs: vec![Transaction {
                    gas_asset_id: 1,
                    gas_price,
                    actions: vec![Action {
                        action_type: ActionType::Transfer,
                        from: "alice".to_string(),
                        to: "bob".to_string(),
                        asset_id: 1,
                        amount: U256::from(1u64),
                        payload: Bytes::new(),
                    }],
                }],
            },
            receipts: vec![Receipt {
                action_results: vec![ActionResult {
                    status: RECEIPT_STATUS_SUCCESSFUL,
                    gas_used,
                }],
            }],
            detail_txs: vec![],
        }
    }

    #[tokio::test]
    async fn apply_accumulates_and_revert_restores() {
        let store = MemStore::new();
        let task = StatTask::new();
        let block = block_with_fee(3, 2, 10);

        let mut tx = store.begin().await.expect("begin");
        BlockTask::<MemStore>::apply(&task, &block, &mut tx).await.expect("apply");
        tx.commit().await.expect("commit");

        let status = store.chain_status_snapshot();
        assert_eq!(status.height, 3);
        assert_eq!(status.tx_count, 1);
        assert_eq!(status.fee_income, U256::from(20u64));

        let mut tx = store.begin().await.expect("begin");
        BlockTask::<MemStore>::revert(&task, &block, &mut tx).await.expect("revert");
        tx.commit().await.expect("commit");

        let status = store.chain_status_snapshot();
        assert_eq!(status.height, 2);
        assert_eq!(status.tx_count, 0);
        assert_eq!(status.fee_income, U256::ZERO);
    }

    #[tokio::test]
    async fn genesis_block_adds_no_fees() {
        let store = MemStore::new();
        let task = StatTask::new();

        let mut tx = store.begin().await.expect("begin");
        BlockTask::<MemStore>::apply(&task, &block_with_fee(0, 2, 10), &mut tx)
            .await
            .expect("apply");
        tx.commit().await.expect("commit");

        let status = store.chain_status_snapshot();
        assert_eq!(status.height, 0);
        assert_eq!(status.tx_count, 1);
        assert_eq!(status.fee_income, U256::ZERO);
    }
}
