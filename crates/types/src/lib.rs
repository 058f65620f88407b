//! Core types shared across the chainscan indexer.
//!
//! The chain RPC serves these types as camelCase JSON; the reversible block
//! cache round-trips them through RLP. Both representations live on the same
//! structs so the two boundaries cannot drift apart.

mod action;
pub use action::{Action, ActionType};

mod block;
pub use block::{Block, BlockAndResult, BlockHeader, Transaction, decode_block, encode_block};

mod receipt;
pub use receipt::{
    ActionResult, DetailTx, InternalActions, InternalLog, RECEIPT_STATUS_SUCCESSFUL, Receipt,
};

mod payload;
pub use payload::{AssetInfo, IssueAssetPayload};
