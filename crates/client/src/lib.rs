//! Chain RPC adapter.
//!
//! The indexer talks to the chain node through the [`ChainClient`] trait;
//! [`RpcChainClient`] implements it over a JSON-RPC transport.

mod error;
pub use error::ClientError;

mod traits;
pub use traits::ChainClient;

mod rpc;
pub use rpc::RpcChainClient;
