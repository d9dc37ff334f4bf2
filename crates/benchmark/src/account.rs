use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use ckb_fixed_hash::H256;
use ckb_jsonrpc_types::{JsonBytes, Uint32};
use ckb_types::{bytes::Bytes, core::ScriptHashType, packed::Script, prelude::*};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{batch::batch_execute, godwoken_rpc::GodwokenRpcClient};

pub const ETH_ADDRESS_LEN: usize = 20;

pub type EthAddress = [u8; ETH_ADDRESS_LEN];

/// Rollup parameters an EOA script hash is derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollupContext {
    pub rollup_type_hash: H256,
    pub eth_account_lock_hash: H256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub eth_address: String,
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uint32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub account: Account,
    pub eth_address: EthAddress,
    pub script_hash: H256,
    pub polyjuice_address: EthAddress,
    pub account_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractAccountInfo {
    pub address: EthAddress,
    pub script_hash: H256,
    pub account_id: u32,
}

pub fn hex_address(address: &EthAddress) -> String {
    format!("0x{}", hex::encode(address))
}

pub fn parse_eth_address(address: &str) -> Result<EthAddress> {
    let data = hex::decode(address.trim().trim_start_matches("0x"))
        .map_err(|err| anyhow!("invalid eth address {}: {}", address, err))?;
    if data.len() != ETH_ADDRESS_LEN {
        bail!("invalid eth address {}: expect 20 bytes", address);
    }
    let mut eth_address = [0u8; ETH_ADDRESS_LEN];
    eth_address.copy_from_slice(&data);
    Ok(eth_address)
}

pub fn parse_private_key(privkey: &str) -> Result<H256> {
    let data = hex::decode(privkey.trim().trim_start_matches("0x"))
        .map_err(|err| anyhow!("parse private key with error: {:?}", err))?;
    H256::from_slice(&data).map_err(|err| anyhow!("parse private key with error: {:?}", err))
}

pub fn privkey_to_eth_address(privkey: &H256) -> Result<EthAddress> {
    let secp = secp256k1::Secp256k1::new();
    let privkey = secp256k1::SecretKey::from_slice(privkey.as_bytes())
        .map_err(|err| anyhow!("Invalid secp256k1 secret key format, error: {}", err))?;
    let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &privkey);
    let pubkey_hash = Keccak256::digest(&pubkey.serialize_uncompressed()[1..]);
    let mut eth_address = [0u8; ETH_ADDRESS_LEN];
    eth_address.copy_from_slice(&pubkey_hash[12..]);
    Ok(eth_address)
}

/// Layer2 script hash of the eth EOA, `args = rollup_type_hash | eth_address`.
pub fn eth_address_to_script_hash(ctx: &RollupContext, eth_address: &EthAddress) -> H256 {
    let mut args = ctx.rollup_type_hash.as_bytes().to_vec();
    args.extend_from_slice(eth_address);
    let script = Script::new_builder()
        .code_hash(ctx.eth_account_lock_hash.pack())
        .hash_type(ScriptHashType::Type.into())
        .args(Bytes::from(args).pack())
        .build();
    ckb_hash::blake2b_256(script.as_slice()).into()
}

/// Godwoken short address, the first 20 bytes of a script hash.
pub fn to_short_address(script_hash: &H256) -> EthAddress {
    let mut short_address = [0u8; ETH_ADDRESS_LEN];
    short_address.copy_from_slice(&script_hash.as_bytes()[..ETH_ADDRESS_LEN]);
    short_address
}

/// Loads a JSON array of accounts, or one private key per line.
pub fn load_accounts(path: impl AsRef<Path>) -> Result<Vec<Account>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("read accounts file {}", path.display()))?;
    if content.trim_start().starts_with('[') {
        let accounts: Vec<Account> = serde_json::from_str(&content)?;
        return Ok(accounts);
    }
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let privkey = parse_private_key(line)?;
            let eth_address = privkey_to_eth_address(&privkey)?;
            Ok(Account {
                eth_address: hex_address(&eth_address),
                private_key: format!("0x{}", hex::encode(privkey.as_bytes())),
                account_id: None,
            })
        })
        .collect()
}

pub(crate) async fn to_account_info(
    rpc_client: &GodwokenRpcClient,
    ctx: &RollupContext,
    account: Account,
) -> Result<AccountInfo> {
    let eth_address = parse_eth_address(&account.eth_address)?;
    let script_hash = eth_address_to_script_hash(ctx, &eth_address);
    let polyjuice_address = to_short_address(&script_hash);
    let account_id = rpc_client
        .get_account_id_by_script_hash(&script_hash)
        .await?
        .ok_or_else(|| anyhow!("no account id, please deposit first"))?;
    log::debug!(
        "account {} script hash: {:#x}, id: {}",
        account.eth_address,
        script_hash,
        account_id
    );
    Ok(AccountInfo {
        account,
        eth_address,
        script_hash,
        polyjuice_address,
        account_id,
    })
}

/// Resolves every account on chain; accounts failing to resolve are logged
/// and left out of the result.
pub async fn resolve_accounts(
    rpc_client: &GodwokenRpcClient,
    ctx: &RollupContext,
    accounts: Vec<Account>,
    chunk_size: usize,
) -> Vec<AccountInfo> {
    batch_execute("resolve_accounts", accounts, chunk_size, |chunk| async move {
        let futures = chunk.into_iter().map(|account| async move {
            let eth_address = account.eth_address.clone();
            match to_account_info(rpc_client, ctx, account).await {
                Ok(info) => Some(info),
                Err(err) => {
                    log::warn!("init account info failed {}, err: {}", eth_address, err);
                    None
                }
            }
        });
        join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
    })
    .await
}

pub async fn resolve_contract(
    rpc_client: &GodwokenRpcClient,
    address: &str,
) -> Result<ContractAccountInfo> {
    let resolve = async {
        let contract_address = parse_eth_address(address)?;
        let short_address = JsonBytes::from_vec(contract_address.to_vec());
        let script_hash = rpc_client
            .get_script_hash_by_short_address(short_address)
            .await?
            .ok_or_else(|| anyhow!("account {} has no script hash, please deposit first", address))?;
        let account_id = rpc_client
            .get_account_id_by_script_hash(&script_hash)
            .await?
            .ok_or_else(|| anyhow!("account {} has no account id, please deposit first", address))?;
        Ok::<_, anyhow::Error>(ContractAccountInfo {
            address: contract_address,
            script_hash,
            account_id,
        })
    };
    let contract = resolve
        .await
        .with_context(|| format!("init contract account info failed {}", address))?;
    log::info!(
        "init contract account info {}, id: {}",
        address,
        contract.account_id
    );
    Ok(contract)
}
