//! Top-level actions carried by transactions.

use alloy_primitives::{Bytes, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// The kind of a top-level [`Action`].
///
/// Encoded as its numeric discriminant on both the RPC and the cache
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u64", try_from = "u64")]
pub enum ActionType {
    /// Plain asset transfer.
    Transfer,
    /// Account creation.
    CreateAccount,
    /// Asset issuance. At genesis this seeds initial balances.
    IssueAsset,
    /// Increase of an already issued asset's supply.
    IncreaseAsset,
    /// Asset destruction.
    DestroyAsset,
    /// Contract deployment.
    CreateContract,
    /// Contract invocation.
    CallContract,
}

impl From<ActionType> for u64 {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Transfer => 0,
            ActionType::CreateAccount => 1,
            ActionType::IssueAsset => 2,
            ActionType::IncreaseAsset => 3,
            ActionType::DestroyAsset => 4,
            ActionType::CreateContract => 5,
            ActionType::CallContract => 6,
        }
    }
}

impl TryFrom<u64> for ActionType {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Transfer),
            1 => Ok(Self::CreateAccount),
            2 => Ok(Self::IssueAsset),
            3 => Ok(Self::IncreaseAsset),
            4 => Ok(Self::DestroyAsset),
            5 => Ok(Self::CreateContract),
            6 => Ok(Self::CallContract),
            other => Err(format!("unknown action type {other}")),
        }
    }
}

impl Encodable for ActionType {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        u64::from(*self).encode(out);
    }

    fn length(&self) -> usize {
        u64::from(*self).length()
    }
}

impl Decodable for ActionType {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let raw = u64::decode(buf)?;
        Self::try_from(raw).map_err(|_| alloy_rlp::Error::Custom("unknown action type"))
    }
}

/// A top-level operation within a transaction.
///
/// An empty `from`/`to` string means "no party" on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// The kind of operation.
    pub action_type: ActionType,
    /// Sender account name; empty when the action has no sender.
    pub from: String,
    /// Recipient account name; empty when the action has no recipient.
    pub to: String,
    /// Asset moved by the action.
    pub asset_id: u64,
    /// Amount moved by the action.
    pub amount: U256,
    /// Action-type-specific payload, RLP-encoded.
    pub payload: Bytes,
}
