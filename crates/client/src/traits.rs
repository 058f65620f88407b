use crate::ClientError;
use async_trait::async_trait;
use chainscan_types::{AssetInfo, BlockAndResult};

/// Read access to a running chain node.
///
/// Implementations are expected to be cheap to share (`Arc`) between the
/// producer, the fan-out loop, and the pruner.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Fetches the block at `height` together with its execution results.
    ///
    /// Returns `Ok(None)` when the chain has not produced the block yet.
    async fn block_and_result(&self, height: u64)
    -> Result<Option<BlockAndResult>, ClientError>;

    /// Returns the highest finalized (irreversible) block height.
    async fn finalized_height(&self) -> Result<u64, ClientError>;

    /// Resolves asset metadata by asset name.
    async fn asset_info_by_name(&self, name: &str) -> Result<AssetInfo, ClientError>;
}
