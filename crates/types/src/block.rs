//! Block model and the reversible-cache codec.

use crate::{Action, DetailTx, Receipt};
use alloy_primitives::B256;
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Block header fields consumed by the indexer.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block height; genesis is 0.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Block timestamp.
    pub time: u64,
}

/// A transaction and its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Asset the transaction pays gas in.
    pub gas_asset_id: u64,
    /// Gas price; fees are `gas_used * gas_price` in `gas_asset_id`.
    pub gas_price: u64,
    /// Top-level actions, co-indexed with the receipt's action results.
    pub actions: Vec<Action>,
}

/// A block as served by the chain RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// Transactions included in the block.
    pub txs: Vec<Transaction>,
}

/// A block together with its execution results.
///
/// `detail_txs` is empty when the chain did not serve internal traces for the
/// block; when present it is co-indexed with `block.txs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct BlockAndResult {
    /// The block itself.
    pub block: Block,
    /// Execution receipts, co-indexed with `block.txs`.
    pub receipts: Vec<Receipt>,
    /// Detailed internal traces, co-indexed with `block.txs` when non-empty.
    #[serde(default)]
    pub detail_txs: Vec<DetailTx>,
}

impl BlockAndResult {
    /// Block height shorthand.
    pub const fn height(&self) -> u64 {
        self.block.header.number
    }

    /// Block hash shorthand.
    pub const fn hash(&self) -> B256 {
        self.block.header.hash
    }

    /// Parent hash shorthand.
    pub const fn parent_hash(&self) -> B256 {
        self.block.header.parent_hash
    }
}

/// Encodes a block for the reversible block cache.
pub fn encode_block(block: &BlockAndResult) -> Vec<u8> {
    let mut out = Vec::with_capacity(block.length());
    block.encode(&mut out);
    out
}

/// Decodes a cached block. Inverse of [`encode_block`].
pub fn decode_block(data: &[u8]) -> alloy_rlp::Result<BlockAndResult> {
    let mut buf = data;
    BlockAndResult::decode(&mut buf)
}
