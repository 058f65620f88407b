use crate::task::TaskError;
use chainscan_client::ClientError;
use chainscan_storage::StorageError;
use thiserror::Error;

/// Fatal errors of the dispatch pipeline.
///
/// The producer absorbs transient RPC failures with retries; everything that
/// reaches this type terminates the process. Recovery is by restart, which
/// resumes from the last committed task heights.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A store operation outside a task transaction failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A chain RPC call failed where retrying is not an option.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A derivation task failed to apply or revert a block.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A configured task name has no registered implementation.
    #[error("unknown task name: {0}")]
    UnknownTask(String),

    /// A cached reversible block failed to decode.
    #[error("cached block at height {height} is corrupt")]
    BlockDecode {
        /// Height of the corrupt cache entry.
        height: u64,
        /// The decoder failure.
        #[source]
        source: alloy_rlp::Error,
    },

    /// The reversible cache is missing an entry it must contain.
    #[error("reversible cache has no entry at height {0}")]
    ReversibleCacheGap(u64),

    /// A rollback would descend to or past the finalized height.
    #[error("rollback would descend past finalized height {finalized}")]
    RollbackPastFinalized {
        /// The finalized height at rollback time.
        finalized: u64,
    },

    /// The chain refused to serve a block it must have.
    #[error("chain has no block at height {0}")]
    MissingChainBlock(u64),

    /// A pipeline channel closed while the pipeline was still running.
    #[error("pipeline channel closed unexpectedly")]
    ChannelClosed,

    /// A worker panicked or was aborted.
    #[error("pipeline worker failed")]
    Join(#[from] tokio::task::JoinError),
}
