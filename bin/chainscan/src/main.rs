//! CLI entry point of the chainscan indexer.

use alloy_rpc_client::RpcClient;
use anyhow::Context;
use chainscan_client::RpcChainClient;
use chainscan_core::{Config, Dispatcher};
use chainscan_storage::MysqlStore;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// The chainscan indexer CLI.
#[derive(Parser, Debug)]
#[command(author, version, about = "Reorg-aware blockchain indexer", long_about = None)]
struct Cli {
    /// Chain node JSON-RPC endpoint.
    #[arg(long = "chain-rpc", env = "CHAIN_RPC")]
    chain_rpc: Url,

    /// MySQL connection string.
    #[arg(long = "database-url", env = "DATABASE_URL")]
    database_url: String,

    /// Derivation tasks to run; order defines channel indices.
    #[arg(
        long,
        env = "TASKS",
        value_delimiter = ',',
        default_values_t = ["balance".to_string(), "stat".to_string()]
    )]
    tasks: Vec<String>,

    /// Capacity of the block channel between the puller and the dispatcher.
    #[arg(long = "block-chan-buffer", env = "BLOCK_CHAN_BUFFER", default_value_t = 256)]
    block_chan_buffer: usize,

    /// Sentinel account representing the chain itself; excluded from balance
    /// bookkeeping.
    #[arg(long = "chain-fee-account", env = "CHAIN_FEE_ACCOUNT", default_value = "chain.fee")]
    chain_fee_account: String,

    /// Emit a progress log every this many committed blocks.
    #[arg(long = "sync-log-interval", env = "SYNC_LOG_INTERVAL", default_value_t = 100)]
    sync_log_interval: u64,

    /// Verbosity level (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl Cli {
    fn init_tracing(&self) {
        let default_directive = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    fn config(&self) -> Config {
        Config {
            tasks: self.tasks.clone(),
            block_chan_buffer: self.block_chan_buffer,
            chain_fee_account: self.chain_fee_account.clone(),
            sync_log_interval: self.sync_log_interval,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    let store = MysqlStore::connect(&cli.database_url)
        .await
        .context("failed to connect to the database")?;
    store.ensure_schema().await.context("failed to initialize the database schema")?;

    let client = RpcChainClient::new(RpcClient::new_http(cli.chain_rpc.clone()));

    info!(target: "chainscan", chain_rpc = %cli.chain_rpc, tasks = ?cli.tasks, "Starting indexer");

    let dispatcher = Dispatcher::new(cli.config(), Arc::new(store), Arc::new(client));
    dispatcher.run().await.context("dispatch pipeline failed")?;
    Ok(())
}
