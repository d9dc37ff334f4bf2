pub mod account;
pub mod batch;
pub mod config;
pub mod error;
pub mod fee;
pub mod godwoken_rpc;
pub mod packed;
pub mod plan;
pub mod probe;
pub mod receipt;
pub mod stats;
#[cfg(test)]
mod test_utils;
pub mod tx;

use std::{env::current_dir, fs, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, Result};
use ckb_fixed_hash::H256;

use crate::{
    account::{
        load_accounts, resolve_accounts, resolve_contract, Account, ContractAccountInfo,
        RollupContext,
    },
    fee::GasPriceTiers,
    godwoken_rpc::GodwokenRpcClient,
    plan::FeePlan,
    probe::CallProbe,
};

const GENERATE_CONFIG_FILE_PATH: &str = "./gw_fee_benchmark_config.toml";

pub fn generate_config_file(path: Option<&str>) -> Result<()> {
    let config = config::Config::default();
    let path = path.unwrap_or(GENERATE_CONFIG_FILE_PATH);
    let path = current_dir()?.join(path);
    let content = toml::to_string(&config)?;
    log::debug!("content: {}", &content);
    fs::write(&path, content)?;
    log::info!("Generate fee benchmark config file in: {:?}", &path);
    Ok(())
}

fn read_config(path: impl AsRef<Path>) -> Result<config::Config> {
    let content = fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

fn parse_h256(name: &str, hash: &str) -> Result<H256> {
    H256::from_str(hash.trim().trim_start_matches("0x"))
        .map_err(|err| anyhow!("parse {} with error: {:?}", name, err))
}

/// Everything a run needs before the first transaction is built.
struct Env {
    config: config::Config,
    rpc_client: GodwokenRpcClient,
    rollup: RollupContext,
    contract: ContractAccountInfo,
    accounts: Vec<Account>,
}

async fn init_env(path: Option<&str>) -> Result<Env> {
    let path = path.unwrap_or(GENERATE_CONFIG_FILE_PATH);
    let config = read_config(path)?;
    let rollup = RollupContext {
        rollup_type_hash: parse_h256("rollup_type_hash", &config.rollup_type_hash)?,
        eth_account_lock_hash: parse_h256(
            "eth_account_lock_hash",
            &config.eth_account_lock_hash,
        )?,
    };

    let mut accounts = load_accounts(&config.accounts_path)?;
    let total = accounts.len();
    if let Some(max_accounts) = config.max_accounts {
        accounts.truncate(max_accounts);
    }
    log::info!(
        "load {} accounts, ready to test with {}",
        total,
        accounts.len()
    );

    let url = reqwest::Url::parse(&config.rpc_url)?;
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let rpc_client = GodwokenRpcClient::with_url(url, Some(timeout))?;
    let contract = resolve_contract(&rpc_client, &config.contract_address).await?;
    Ok(Env {
        config,
        rpc_client,
        rollup,
        contract,
        accounts,
    })
}

async fn init_fee_plan(path: Option<&str>) -> Result<(FeePlan, Vec<Account>, usize)> {
    let Env {
        config,
        rpc_client,
        rollup,
        contract,
        accounts,
    } = init_env(path).await?;

    let gas_price = match config.gas_price {
        Some(gas_price) => gas_price as u128,
        None => rpc_client.gas_price().await?,
    };
    log::info!("current gas price: {}", gas_price);
    let tiers = GasPriceTiers::from_network_price(gas_price);

    let plan = FeePlan::new(rpc_client, rollup, contract, tiers, config.plan_config());
    Ok((plan, accounts, config.rounds))
}

pub async fn run(path: Option<&str>) -> Result<()> {
    let (plan, accounts, _) = init_fee_plan(path).await?;
    let results = plan.run(accounts).await?;
    stats::output_report(&results);
    Ok(())
}

pub async fn run_rounds(path: Option<&str>) -> Result<()> {
    let (plan, accounts, rounds) = init_fee_plan(path).await?;
    let results = plan.run_rounds(accounts, rounds).await?;
    stats::output_report(&results);
    Ok(())
}

pub async fn probe(path: Option<&str>) -> Result<()> {
    let Env {
        config,
        rpc_client,
        rollup,
        contract,
        accounts,
    } = init_env(path).await?;

    let infos = resolve_accounts(&rpc_client, &rollup, accounts, config.resolve_chunk_size).await;
    let probe = CallProbe::new(
        rpc_client,
        contract,
        config.dispatch_chunk_size,
        config.probe.clone(),
    );
    let summary = probe.run(infos).await?;
    for phase in summary.phases {
        log::info!(
            "{}: success {}, failure {}",
            phase.name,
            phase.success,
            phase.failure
        );
    }
    Ok(())
}
