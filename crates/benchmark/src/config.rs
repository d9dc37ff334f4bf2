use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    batch::DEFAULT_DISPATCH_CHUNK_SIZE,
    plan::{PlanConfig, DEFAULT_RESOLVE_CHUNK_SIZE},
    probe::ProbeConfig,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    pub accounts_path: PathBuf,
    pub max_accounts: Option<usize>,
    pub contract_address: String,
    pub rollup_type_hash: String,
    pub eth_account_lock_hash: String,
    /// Skips `eth_gasPrice` when set.
    pub gas_price: Option<u64>,
    pub resolve_chunk_size: usize,
    pub dispatch_chunk_size: usize,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub http_timeout_secs: u64,
    /// Rows sent by the `rounds` subcommand.
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default)]
    pub probe: ProbeConfig,
}

pub const DEFAULT_ROUNDS: usize = 10;

fn default_rounds() -> usize {
    DEFAULT_ROUNDS
}

impl Config {
    pub fn plan_config(&self) -> PlanConfig {
        PlanConfig {
            resolve_chunk_size: self.resolve_chunk_size,
            dispatch_chunk_size: self.dispatch_chunk_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: String::from("http://localhost:8024"),
            accounts_path: PathBuf::from("./accounts.json"),
            max_accounts: None,
            contract_address: String::from("0x"),
            rollup_type_hash: String::from("0x"),
            eth_account_lock_hash: String::from("0x"),
            gas_price: None,
            resolve_chunk_size: DEFAULT_RESOLVE_CHUNK_SIZE,
            dispatch_chunk_size: DEFAULT_DISPATCH_CHUNK_SIZE,
            poll_interval_ms: 1000,
            poll_timeout_ms: 120_000,
            http_timeout_secs: 15,
            rounds: DEFAULT_ROUNDS,
            probe: ProbeConfig::default(),
        }
    }
}
