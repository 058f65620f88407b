//! JSON-RPC implementation of [`ChainClient`].

use crate::{ChainClient, ClientError};
use alloy_rpc_client::RpcClient;
use async_trait::async_trait;
use chainscan_types::{AssetInfo, BlockAndResult};
use serde::Deserialize;
use tracing::trace;

/// Response shape of `chain_getFinalizedHeight`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizedStatus {
    finalized_height: u64,
}

/// [`ChainClient`] backed by a JSON-RPC node endpoint.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: RpcClient,
}

impl RpcChainClient {
    /// Creates a new [`RpcChainClient`] over an existing RPC client.
    pub const fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn block_and_result(
        &self,
        height: u64,
    ) -> Result<Option<BlockAndResult>, ClientError> {
        trace!(target: "chainscan::client", height, "Fetching block and result");
        let block = self
            .client
            .request::<_, Option<BlockAndResult>>("chain_getBlockAndResult", (height,))
            .await?;
        Ok(block)
    }

    async fn finalized_height(&self) -> Result<u64, ClientError> {
        let status = self
            .client
            .request_noparams::<FinalizedStatus>("chain_getFinalizedHeight")
            .await?;
        Ok(status.finalized_height)
    }

    async fn asset_info_by_name(&self, name: &str) -> Result<AssetInfo, ClientError> {
        let info =
            self.client.request::<_, AssetInfo>("chain_getAssetInfoByName", (name,)).await?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_transport::mock::{Asserter, MockTransport};
    use chainscan_types::{Block, BlockHeader};

    fn mocked_client(asserter: &Asserter) -> RpcChainClient {
        let transport = MockTransport::new(asserter.clone());
        RpcChainClient::new(RpcClient::new(transport, false))
    }

    #[tokio::test]
    async fn fetches_block_and_result() {
        let asserter = Asserter::new();
        let client = mocked_client(&asserter);

        let block = BlockAndResult {
            block: Block {
                header: BlockHeader { number: 3, ..Default::default() },
                txs: vec![],
            },
            receipts: vec![],
            detail_txs: vec![],
        };
        asserter.push_success(&block);

        let fetched = client.block_and_result(3).await.expect("request");
        assert_eq!(fetched, Some(block));
    }

    #[tokio::test]
    async fn missing_block_is_none() {
        let asserter = Asserter::new();
        let client = mocked_client(&asserter);

        asserter.push_success(&serde_json::Value::Null);

        let fetched = client.block_and_result(9).await.expect("request");
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn fetches_finalized_height() {
        let asserter = Asserter::new();
        let client = mocked_client(&asserter);

        asserter.push_success(&serde_json::json!({ "finalizedHeight": 42 }));

        assert_eq!(client.finalized_height().await.expect("request"), 42);
    }

    #[tokio::test]
    async fn resolves_asset_info() {
        let asserter = Asserter::new();
        let client = mocked_client(&asserter);

        asserter.push_success(&serde_json::json!({ "assetId": 7, "assetName": "systoken" }));

        let info = client.asset_info_by_name("systoken").await.expect("request");
        assert_eq!(info.asset_id, 7);
        assert_eq!(info.asset_name, "systoken");
    }
}
