//! Per-(account, asset) balance derivation.

use super::{BlockTask, TaskError};
use alloy_primitives::{I256, U256};
use async_trait::async_trait;
use chainscan_client::ChainClient;
use chainscan_storage::{StateStore, StorageError, StoreTx};
use chainscan_types::{
    ActionType, BlockAndResult, IssueAssetPayload, RECEIPT_STATUS_SUCCESSFUL,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;

/// Net signed deltas accumulated over one block, keyed by account then asset.
type DeltaMap = BTreeMap<String, BTreeMap<u64, I256>>;

fn change_balance(
    deltas: &mut DeltaMap,
    account: &str,
    asset_id: u64,
    value: U256,
    credit: bool,
) -> Result<(), TaskError> {
    let signed = I256::try_from(value).map_err(|_| TaskError::ArithmeticOverflow)?;
    let slot = deltas
        .entry(account.to_string())
        .or_default()
        .entry(asset_id)
        .or_insert(I256::ZERO);
    let updated = if credit { slot.checked_add(signed) } else { slot.checked_sub(signed) };
    *slot = updated.ok_or(TaskError::ArithmeticOverflow)?;
    Ok(())
}

/// Derives `account_balance` rows from transfers, fees, genesis issues, and
/// internal actions.
pub struct BalanceTask<C> {
    client: Arc<C>,
    fee_account: String,
}

impl<C> std::fmt::Debug for BalanceTask<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceTask").field("fee_account", &self.fee_account).finish_non_exhaustive()
    }
}

impl<C> BalanceTask<C> {
    /// Creates a new [`BalanceTask`].
    ///
    /// `fee_account` is the sentinel account representing the chain itself;
    /// it never appears in balance rows.
    pub const fn new(client: Arc<C>, fee_account: String) -> Self {
        Self { client, fee_account }
    }

    /// Whether balance bookkeeping tracks this party at all.
    fn tracked(&self, account: &str) -> bool {
        !account.is_empty() && account != self.fee_account
    }
}

impl<C: ChainClient> BalanceTask<C> {
    async fn add_balance<T: StoreTx>(
        &self,
        tx: &mut T,
        account: &str,
        asset_id: u64,
        value: U256,
        height: u64,
        time: u64,
        care_asset: bool,
    ) -> Result<(), TaskError> {
        match tx.account_balance(account, asset_id).await? {
            None => {
                if care_asset {
                    return Err(StorageError::EntryNotFound(format!(
                        "account balance ({account}, {asset_id})"
                    ))
                    .into());
                }
                tx.insert_account_balance(account, asset_id, value, height, time).await?;
            }
            Some(row) => {
                let updated =
                    row.balance.checked_add(value).ok_or(TaskError::ArithmeticOverflow)?;
                tx.update_account_balance(account, asset_id, updated, height, time).await?;
            }
        }
        Ok(())
    }

    async fn sub_balance<T: StoreTx>(
        &self,
        tx: &mut T,
        account: &str,
        asset_id: u64,
        value: U256,
        height: u64,
        time: u64,
    ) -> Result<(), TaskError> {
        let row = tx.account_balance(account, asset_id).await?.ok_or_else(|| {
            StorageError::EntryNotFound(format!("account balance ({account}, {asset_id})"))
        })?;
        let updated = row.balance.checked_sub(value).ok_or_else(|| {
            error!(
                target: "chainscan::task",
                account,
                asset_id,
                balance = %row.balance,
                debit = %value,
                "Balance not enough"
            );
            TaskError::BalanceNotEnough { account: account.to_string(), asset_id }
        })?;
        tx.update_account_balance(account, asset_id, updated, height, time).await?;
        Ok(())
    }

    async fn settle<T: StoreTx>(
        &self,
        tx: &mut T,
        deltas: DeltaMap,
        height: u64,
        time: u64,
    ) -> Result<(), TaskError> {
        for (account, assets) in deltas {
            for (asset_id, delta) in assets {
                if delta.is_zero() {
                    continue;
                }
                if delta.is_negative() {
                    self.sub_balance(tx, &account, asset_id, delta.unsigned_abs(), height, time)
                        .await?;
                } else {
                    self.add_balance(
                        tx,
                        &account,
                        asset_id,
                        delta.unsigned_abs(),
                        height,
                        time,
                        false,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S, C> BlockTask<S> for BalanceTask<C>
where
    S: StateStore,
    C: ChainClient,
{
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn apply(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError> {
        let height = data.block.header.number;
        let time = data.block.header.time;
        let mut deltas = DeltaMap::new();

        for (i, transaction) in data.block.txs.iter().enumerate() {
            let receipt = data.receipts.get(i).ok_or(TaskError::MalformedBlock(i))?;
            for (j, action) in transaction.actions.iter().enumerate() {
                let result =
                    receipt.action_results.get(j).ok_or(TaskError::MalformedBlock(i))?;
                let fee = U256::from(result.gas_used) * U256::from(transaction.gas_price);
                if height > 0 && self.tracked(&action.from) {
                    change_balance(
                        &mut deltas,
                        &action.from,
                        transaction.gas_asset_id,
                        fee,
                        false,
                    )?;
                }
                if result.status != RECEIPT_STATUS_SUCCESSFUL {
                    continue;
                }
                if action.amount > U256::ZERO {
                    if self.tracked(&action.from) {
                        change_balance(
                            &mut deltas,
                            &action.from,
                            action.asset_id,
                            action.amount,
                            false,
                        )?;
                    }
                    if self.tracked(&action.to) {
                        change_balance(
                            &mut deltas,
                            &action.to,
                            action.asset_id,
                            action.amount,
                            true,
                        )?;
                    }
                }
                if height == 0 && action.action_type == ActionType::IssueAsset {
                    // Genesis balances are inserted eagerly: the asset id is
                    // not known until the name resolves.
                    let payload = IssueAssetPayload::decode(&action.payload)
                        .map_err(TaskError::PayloadDecode)?;
                    let info = self.client.asset_info_by_name(&payload.asset_name).await?;
                    tx.insert_account_balance(
                        &payload.owner,
                        info.asset_id,
                        payload.amount,
                        height,
                        time,
                    )
                    .await?;
                }
                if let Some(detail) = data.detail_txs.get(i) {
                    let group =
                        detail.internal_actions.get(j).ok_or(TaskError::MalformedBlock(i))?;
                    for log in &group.internal_logs {
                        // Internal transfers settle with the outer action's
                        // asset and amount.
                        if self.tracked(&log.action.from) {
                            change_balance(
                                &mut deltas,
                                &log.action.from,
                                action.asset_id,
                                action.amount,
                                false,
                            )?;
                        }
                        if self.tracked(&log.action.to) {
                            change_balance(
                                &mut deltas,
                                &log.action.to,
                                action.asset_id,
                                action.amount,
                                true,
                            )?;
                        }
                    }
                }
            }
        }

        self.settle(tx, deltas, height, time).await
    }

    async fn revert(&self, data: &BlockAndResult, tx: &mut S::Tx) -> Result<(), TaskError> {
        let height = data.block.header.number;
        let time = data.block.header.time;
        let mut deltas = DeltaMap::new();

        for (i, transaction) in data.block.txs.iter().enumerate() {
            let receipt = data.receipts.get(i).ok_or(TaskError::MalformedBlock(i))?;
            for (j, action) in transaction.actions.iter().enumerate() {
                let result =
                    receipt.action_results.get(j).ok_or(TaskError::MalformedBlock(i))?;
                let fee = U256::from(result.gas_used) * U256::from(transaction.gas_price);
                if self.tracked(&action.from) {
                    self.add_balance(
                        tx,
                        &action.from,
                        transaction.gas_asset_id,
                        fee,
                        height,
                        time,
                        false,
                    )
                    .await?;
                }
                if result.status != RECEIPT_STATUS_SUCCESSFUL {
                    continue;
                }
                if action.amount > U256::ZERO {
                    if self.tracked(&action.to) {
                        change_balance(
                            &mut deltas,
                            &action.to,
                            action.asset_id,
                            action.amount,
                            false,
                        )?;
                    }
                    if self.tracked(&action.from) {
                        change_balance(
                            &mut deltas,
                            &action.from,
                            action.asset_id,
                            action.amount,
                            true,
                        )?;
                    }
                }
                if let Some(detail) = data.detail_txs.get(i) {
                    let group =
                        detail.internal_actions.get(j).ok_or(TaskError::MalformedBlock(i))?;
                    for log in &group.internal_logs {
                        // Unlike apply, the undo settles with the inner
                        // action's own asset and amount.
                        if self.tracked(&log.action.to) {
                            change_balance(
                                &mut deltas,
                                &log.action.to,
                                log.action.asset_id,
                                log.action.amount,
                                false,
                            )?;
                        }
                        if self.tracked(&log.action.from) {
                            change_balance(
                                &mut deltas,
                                &log.action.from,
                                log.action.asset_id,
                                log.action.amount,
                                true,
                            )?;
                        }
                    }
                }
            }
        }

        self.settle(tx, deltas, height, time).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainscan_client::ClientError;
    use chainscan_storage::MemStore;
    use chainscan_types::{
        Action, ActionResult, AssetInfo, Block, BlockHeader, Receipt, Transaction,
    };
    use alloy_primitives::Bytes;
    use alloy_rlp::Encodable;
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

    const FEE_ACCOUNT: &str = "chain.fee";

    fn balance_task() -> BalanceTask<MockClient> {
        BalanceTask::new(Arc::new(MockClient::new()), FEE_ACCOUNT.to_string())
    }

    fn transfer_action(from: &str, to: &str, asset_id: u64, amount: u64) -> Action {
        Action {
            action_type: ActionType::Transfer,
            from: from.to_string(),
            to: to.to_string(),
            asset_id,
            amount: U256::from(amount),
            payload: Bytes::new(),
        }
    }

    fn transfer_block(height: u64, from: &str, to: &str, amount: u64) -> BlockAndResult {
        BlockAndResult {
            block: Block {
                header: BlockHeader { number: height, time: 1_000 + height, ..Default::default() },
                txs: vec![Transaction {
                    gas_asset_id: 1,
                    gas_price: 10,
                    actions: vec![transfer_action(from, to, 1, amount)],
                }],
            },
            receipts: vec![Receipt {
                action_results: vec![ActionResult { status: RECEIPT_STATUS_SUCCESSFUL, gas_used: 2 }],
            }],
            detail_txs: vec![],
        }
    }

    async fn apply_committed(
        task: &BalanceTask<MockClient>,
        store: &MemStore,
        block: &BlockAndResult,
    ) -> Result<(), TaskError> {
        let mut tx = store.begin().await.expect("begin");
        BlockTask::<MemStore>::apply(task, block, &mut tx).await?;
        tx.commit().await.expect("commit");
        Ok(())
    }

    async fn revert_committed(
        task: &BalanceTask<MockClient>,
        store: &MemStore,
        block: &BlockAndResult,
    ) -> Result<(), TaskError> {
        let mut tx = store.begin().await.expect("begin");
        BlockTask::<MemStore>::revert(task, block, &mut tx).await?;
        tx.commit().await.expect("commit");
        Ok(())
    }

    #[tokio::test]
    async fn transfer_debits_amount_and_fee() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        let task = balance_task();

        apply_committed(&task, &store, &transfer_block(1, "alice", "bob", 100))
            .await
            .expect("apply");

        assert_eq!(store.balance_of("alice", 1), Some(U256::from(880u64)));
        assert_eq!(store.balance_of("bob", 1), Some(U256::from(100u64)));
    }

    #[tokio::test]
    async fn revert_restores_balances() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        store.set_balance("bob", 1, U256::from(5u64));
        let task = balance_task();
        let block = transfer_block(1, "alice", "bob", 100);

        apply_committed(&task, &store, &block).await.expect("apply");
        revert_committed(&task, &store, &block).await.expect("revert");

        assert_eq!(store.balance_of("alice", 1), Some(U256::from(1_000u64)));
        assert_eq!(store.balance_of("bob", 1), Some(U256::from(5u64)));
    }

    #[tokio::test]
    async fn insufficient_balance_is_fatal_and_uncommitted() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(100u64));
        let task = balance_task();

        let err = apply_committed(&task, &store, &transfer_block(1, "alice", "bob", 10_000))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TaskError::BalanceNotEnough { ref account, asset_id: 1 } if account == "alice"
        ));
        assert_eq!(store.balance_of("alice", 1), Some(U256::from(100u64)));
        assert_eq!(store.balance_of("bob", 1), None);
    }

    #[tokio::test]
    async fn genesis_issue_asset_seeds_owner_balance() {
        let store = MemStore::new();
        let mut client = MockClient::new();
        client.expect_asset_info_by_name().returning(|name| {
            Ok(AssetInfo { asset_id: 7, asset_name: name.to_string() })
        });
        let task = BalanceTask::new(Arc::new(client), FEE_ACCOUNT.to_string());

        let payload = IssueAssetPayload {
            asset_name: "systoken".to_string(),
            symbol: "SYS".to_string(),
            amount: U256::from(1_000u64),
            owner: "eve".to_string(),
        };
        let mut encoded = Vec::new();
        payload.encode(&mut encoded);

        let block = BlockAndResult {
            block: Block {
                header: BlockHeader { number: 0, time: 1_000, ..Default::default() },
                txs: vec![Transaction {
                    gas_asset_id: 0,
                    gas_price: 0,
                    actions: vec![Action {
                        action_type: ActionType::IssueAsset,
                        from: String::new(),
                        to: String::new(),
                        asset_id: 0,
                        amount: U256::ZERO,
                        payload: encoded.into(),
                    }],
                }],
            },
            receipts: vec![Receipt {
                action_results: vec![ActionResult { status: RECEIPT_STATUS_SUCCESSFUL, gas_used: 0 }],
            }],
            detail_txs: vec![],
        };

        apply_committed(&task, &store, &block).await.expect("apply");
        assert_eq!(store.balance_of("eve", 7), Some(U256::from(1_000u64)));
    }

    #[tokio::test]
    async fn genesis_charges_no_fees() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        let task = balance_task();

        apply_committed(&task, &store, &transfer_block(0, "alice", "bob", 100))
            .await
            .expect("apply");

        // Only the transferred amount moves at height 0.
        assert_eq!(store.balance_of("alice", 1), Some(U256::from(900u64)));
        assert_eq!(store.balance_of("bob", 1), Some(U256::from(100u64)));
    }

    #[tokio::test]
    async fn sentinel_fee_account_is_not_tracked() {
        let store = MemStore::new();
        store.set_balance("bob", 1, U256::from(5u64));
        let task = balance_task();

        apply_committed(&task, &store, &transfer_block(1, FEE_ACCOUNT, "bob", 100))
            .await
            .expect("apply");

        // The sentinel pays neither the amount nor the fee; bob is credited.
        assert_eq!(store.balance_of(FEE_ACCOUNT, 1), None);
        assert_eq!(store.balance_of("bob", 1), Some(U256::from(105u64)));
    }

    #[tokio::test]
    async fn failed_action_still_pays_fee() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        let task = balance_task();

        let mut block = transfer_block(1, "alice", "bob", 100);
        block.receipts[0].action_results[0].status = 0;

        apply_committed(&task, &store, &block).await.expect("apply");

        assert_eq!(store.balance_of("alice", 1), Some(U256::from(980u64)));
        assert_eq!(store.balance_of("bob", 1), None);
    }

    fn detail_block(height: u64) -> BlockAndResult {
        // Outer action moves 100 of asset 1; the logged internal action
        // carries its own asset 2 and amount 40.
        let mut block = transfer_block(height, "alice", "bob", 100);
        block.detail_txs = vec![chainscan_types::DetailTx {
            internal_actions: vec![chainscan_types::InternalActions {
                internal_logs: vec![chainscan_types::InternalLog {
                    action: transfer_action("carol", "dave", 2, 40),
                }],
            }],
        }];
        block
    }

    #[tokio::test]
    async fn internal_logs_settle_with_outer_action_on_apply() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        store.set_balance("carol", 1, U256::from(500u64));
        let task = balance_task();

        apply_committed(&task, &store, &detail_block(1)).await.expect("apply");

        // carol and dave move the outer 100 of asset 1, not the inner 40 of
        // asset 2.
        assert_eq!(store.balance_of("carol", 1), Some(U256::from(400u64)));
        assert_eq!(store.balance_of("dave", 1), Some(U256::from(100u64)));
        assert_eq!(store.balance_of("carol", 2), None);
    }

    #[tokio::test]
    async fn internal_logs_settle_with_inner_action_on_revert() {
        let store = MemStore::new();
        store.set_balance("alice", 1, U256::from(1_000u64));
        store.set_balance("bob", 1, U256::from(200u64));
        store.set_balance("dave", 2, U256::from(60u64));
        let task = balance_task();

        revert_committed(&task, &store, &detail_block(1)).await.expect("revert");

        // The undo moves the inner 40 of asset 2 from dave back to carol.
        assert_eq!(store.balance_of("dave", 2), Some(U256::from(20u64)));
        assert_eq!(store.balance_of("carol", 2), Some(U256::from(40u64)));
        // Outer transfer and fee come back to alice: 1000 + 100 + 20.
        assert_eq!(store.balance_of("alice", 1), Some(U256::from(1_120u64)));
        assert_eq!(store.balance_of("bob", 1), Some(U256::from(100u64)));
    }
}
