/// Runtime configuration of the dispatch pipeline.
///
/// Process-wide constant after startup; injected rather than global.
#[derive(Debug, Clone)]
pub struct Config {
    /// Names of the derivation tasks to run. Order defines channel indices.
    pub tasks: Vec<String>,
    /// Capacity of the block channel between the producer and the fan-out
    /// loop.
    pub block_chan_buffer: usize,
    /// Sentinel account representing the chain itself; excluded from balance
    /// bookkeeping.
    pub chain_fee_account: String,
    /// Emit a progress log every this many committed blocks.
    pub sync_log_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tasks: vec!["balance".to_string(), "stat".to_string()],
            block_chan_buffer: 256,
            chain_fee_account: "chain.fee".to_string(),
            sync_log_interval: 100,
        }
    }
}
