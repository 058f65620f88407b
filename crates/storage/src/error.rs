use thiserror::Error;

/// Errors that may occur while interacting with the indexer store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying database driver failed.
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),

    /// The expected row was not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A chain-status update was requested with no columns to set.
    #[error("chain status update with no columns")]
    EmptyUpdate,

    /// A persisted value could not be parsed back into its typed form.
    #[error("corrupt persisted value: {0}")]
    CorruptValue(String),
}
