//! Dispatch and reorg engine of the chainscan indexer.
//!
//! The pipeline follows a running chain node in two phases: bulk catch-up to
//! the finalized height, then single-block tailing of the reversible tip.
//! Each block fans out to every configured derivation task behind a per-block
//! barrier, and a parent-hash mismatch at the tip drives a rollback that
//! replays the cached reversible trail in reverse until the stored projection
//! rejoins the canonical chain.

mod config;
pub use config::Config;

mod error;
pub use error::DispatchError;

mod dispatch;
pub use dispatch::Dispatcher;

mod pruner;
pub use pruner::Pruner;

pub mod task;
pub use task::{BalanceTask, BlockTask, StatTask, TaskError, build_tasks};
