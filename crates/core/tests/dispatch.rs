//! End-to-end pipeline test: genesis issue, a transfer, and a depth-1 reorg
//! against a scripted chain.

use alloy_primitives::{B256, Bytes, U256};
use alloy_rlp::Encodable;
use async_trait::async_trait;
use chainscan_client::{ChainClient, ClientError};
use chainscan_core::{Config, Dispatcher};
use chainscan_storage::MemStore;
use chainscan_types::{
    Action, ActionResult, ActionType, AssetInfo, Block, BlockAndResult, BlockHeader,
    IssueAssetPayload, RECEIPT_STATUS_SUCCESSFUL, Receipt, Transaction,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Chain double that serves fork A until the tip is exhausted, then switches
/// the canonical chain to fork B, mimicking a depth-1 reorg at the tip.
struct ScriptedChain {
    finalized: u64,
    fork_a: Vec<BlockAndResult>,
    fork_b: Vec<BlockAndResult>,
    reorged: AtomicBool,
    assets: HashMap<String, AssetInfo>,
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn block_and_result(
        &self,
        height: u64,
    ) -> Result<Option<BlockAndResult>, ClientError> {
        if !self.reorged.load(Ordering::SeqCst) {
            if let Some(block) = self.fork_a.get(height as usize) {
                return Ok(Some(block.clone()));
            }
            // The first request past fork A's tip observes the reorg.
            self.reorged.store(true, Ordering::SeqCst);
        }
        Ok(self.fork_b.get(height as usize).cloned())
    }

    async fn finalized_height(&self) -> Result<u64, ClientError> {
        Ok(self.finalized)
    }

    async fn asset_info_by_name(&self, name: &str) -> Result<AssetInfo, ClientError> {
        Ok(self.assets[name].clone())
    }
}

fn header(number: u64, hash: u8, parent: u8) -> BlockHeader {
    BlockHeader {
        number,
        hash: B256::repeat_byte(hash),
        parent_hash: B256::repeat_byte(parent),
        time: 1_000 + number,
    }
}

fn genesis_block() -> BlockAndResult {
    let payload = IssueAssetPayload {
        asset_name: "systoken".to_string(),
        symbol: "SYS".to_string(),
        amount: U256::from(1_000u64),
        owner: "alice".to_string(),
    };
    let mut encoded = Vec::new();
    payload.encode(&mut encoded);
    BlockAndResult {
        block: Block {
            header: header(0, 0x0a, 0x00),
            txs: vec![Transaction {
                gas_asset_id: 1,
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
    }
}

fn transfer_block(head: BlockHeader, from: &str, to: &str, amount: u64) -> BlockAndResult {
    BlockAndResult {
        block: Block {
            header: head,
            txs: vec![Transaction {
                gas_asset_id: 1,
                gas_price: 10,
                actions: vec![Action {
                    action_type: ActionType::Transfer,
                    from: from.to_string(),
                    to: to.to_string(),
                    asset_id: 1,
                    amount: U256::from(amount),
                    payload: Bytes::new(),
                }],
            }],
        },
        receipts: vec![Receipt {
            action_results: vec![ActionResult { status: RECEIPT_STATUS_SUCCESSFUL, gas_used: 2 }],
        }],
        detail_txs: vec![],
    }
}

fn empty_block(head: BlockHeader) -> BlockAndResult {
    BlockAndResult { block: Block { header: head, txs: vec![] }, receipts: vec![], detail_txs: vec![] }
}

#[tokio::test]
async fn pipeline_survives_depth_one_reorg() {
    let genesis = genesis_block();

    // Fork A: the transfer that will be reorged away.
    let block_b = transfer_block(header(1, 0x0b, 0x0a), "alice", "bob", 100);

    // Fork B: a sibling block at height 1 plus one more on top.
    let block_b2 = transfer_block(header(1, 0xb2, 0x0a), "alice", "carol", 50);
    let block_c2 = empty_block(header(2, 0xc2, 0xb2));

    let chain = Arc::new(ScriptedChain {
        finalized: 0,
        fork_a: vec![genesis.clone(), block_b],
        fork_b: vec![genesis, block_b2, block_c2],
        reorged: AtomicBool::new(false),
        assets: HashMap::from([(
            "systoken".to_string(),
            AssetInfo { asset_id: 1, asset_name: "systoken".to_string() },
        )]),
    });
    let store = Arc::new(MemStore::new());

    let dispatcher = Dispatcher::new(Config::default(), store.clone(), chain);
    let handle = tokio::spawn(dispatcher.run());

    let settled = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if store.task_height("balance") == Some(2)
                && store.task_height("stat") == Some(2)
                && store.chain_status_snapshot().height == 2
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "pipeline did not reach the post-reorg tip in time");
    assert!(!handle.is_finished(), "pipeline stopped with an error");
    handle.abort();

    // Balances converge to the replay of fork B from genesis: alice funded
    // with 1000 at genesis, then 50 + 20 fee to carol on the surviving fork.
    assert_eq!(store.balance_of("alice", 1), Some(U256::from(930u64)));
    assert_eq!(store.balance_of("carol", 1), Some(U256::from(50u64)));
    // bob's credit was reverted; the row remains at zero.
    assert_eq!(store.balance_of("bob", 1), Some(U256::ZERO));

    let status = store.chain_status_snapshot();
    assert_eq!(status.tx_count, 2);
    assert_eq!(status.fee_income, U256::from(20u64));

    // The reversible cache holds exactly the surviving tip blocks.
    assert_eq!(store.reversible_heights(), vec![1, 2]);
}
