//! Typed action payloads and chain RPC response objects.

use alloy_primitives::U256;
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Payload of an [`crate::ActionType::IssueAsset`] action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct IssueAssetPayload {
    /// Name of the issued asset.
    pub asset_name: String,
    /// Symbol of the issued asset.
    pub symbol: String,
    /// Initial supply credited to `owner`.
    pub amount: U256,
    /// Account receiving the initial supply.
    pub owner: String,
}

impl IssueAssetPayload {
    /// Decodes the payload from the RLP bytes of an issue-asset action.
    pub fn decode(data: &[u8]) -> alloy_rlp::Result<Self> {
        let mut buf = data;
        <Self as Decodable>::decode(&mut buf)
    }
}

/// Asset metadata as served by the chain RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    /// Chain-assigned asset identifier.
    pub asset_id: u64,
    /// Asset name the identifier was resolved from.
    pub asset_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Encodable;

    #[test]
    fn issue_asset_payload_round_trips() {
        let payload = IssueAssetPayload {
            asset_name: "systoken".to_string(),
            symbol: "SYS".to_string(),
            amount: U256::from(1_000_000u64),
            owner: "founder".to_string(),
        };
        let mut out = Vec::new();
        payload.encode(&mut out);
        assert_eq!(IssueAssetPayload::decode(&out).expect("decode"), payload);
    }
}
