use thiserror::Error;

/// Errors returned by a [`crate::ChainClient`].
///
/// A missing block is not an error; it is modelled as `Ok(None)` on
/// [`crate::ChainClient::block_and_result`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The JSON-RPC transport failed or the node returned an error response.
    #[error("chain rpc request failed")]
    Transport(#[from] alloy_transport::TransportError),
}
