//! Store adapter for the chainscan indexer.
//!
//! The core drives persistence exclusively through the [`StateStore`] and
//! [`StoreTx`] traits: pool-level operations (task status bootstrap, the
//! reversible block cache, pruning) live on the store, while every per-block
//! mutation happens inside one [`StoreTx`] so a task's derived writes commit
//! atomically with its `task_status` bump.
//!
//! [`MysqlStore`] is the production implementation; [`MemStore`] is a
//! hash-map implementation backing the test suites of this crate and the
//! core crate.

mod error;
pub use error::StorageError;

mod models;
pub use models::{AccountBalance, BlockOriginal, ChainStatus, ChainStatusUpdate, TaskStatus};

mod traits;
pub use traits::{StateStore, StoreTx};

mod mysql;
pub use mysql::{MysqlStore, MysqlStoreTx};

mod mem;
pub use mem::{MemStore, MemStoreTx};
