//! Execution receipts and detailed internal action traces.

use crate::Action;
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Receipt status of an action that executed successfully.
pub const RECEIPT_STATUS_SUCCESSFUL: u64 = 1;

/// Per-action execution outcome, co-indexed with the transaction's actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// Execution status; [`RECEIPT_STATUS_SUCCESSFUL`] on success.
    pub status: u64,
    /// Gas consumed by the action.
    pub gas_used: u64,
}

/// Execution receipt of one transaction, co-indexed with the block's
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// One result per action of the transaction.
    pub action_results: Vec<ActionResult>,
}

/// One internal effect logged under a top-level action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct InternalLog {
    /// The action describing the internal effect.
    pub action: Action,
}

/// The internal effects triggered by one top-level action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct InternalActions {
    /// Logged internal effects, in execution order.
    pub internal_logs: Vec<InternalLog>,
}

/// Detailed trace of one transaction, co-indexed with the block's
/// transactions; `internal_actions` is co-indexed with the transaction's
/// actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct DetailTx {
    /// Internal action groups, one per top-level action.
    pub internal_actions: Vec<InternalActions>,
}
