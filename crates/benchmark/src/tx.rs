use anyhow::{anyhow, Result};
use bytes::Bytes;
use ckb_crypto::secp::Privkey;
use ckb_fixed_hash::H256;
use ckb_hash::new_blake2b;
use sha3::{Digest, Keccak256};

use crate::{
    account::{parse_private_key, AccountInfo, ContractAccountInfo, EthAddress},
    fee::GasPriceTier,
    packed::{
        AddressMapping, L2Transaction, L2TransactionWithAddressMapping, PolyjuiceArgs,
        RawL2Transaction, RawL2TransactionWithAddressMapping, SIGNATURE_SIZE,
    },
};

pub const DEFAULT_GAS_LIMIT: u64 = 0xffffff;

/// An eth style contract call, before it is turned into a layer2 transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthTransaction {
    pub from: EthAddress,
    pub to: EthAddress,
    pub data: Bytes,
    pub gas_price: u128,
    pub gas: u64,
    pub value: u128,
}

impl EthTransaction {
    pub fn to_polyjuice_args(&self) -> PolyjuiceArgs {
        PolyjuiceArgs {
            is_create: false,
            gas_limit: self.gas,
            gas_price: self.gas_price,
            value: self.value,
            input: self.data.clone(),
        }
    }
}

/// A serialized, signed transaction ready for submission. It is submitted at
/// most once, a failure is reported rather than retried with a new nonce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub serialized: Bytes,
    pub gas_price: u128,
    pub gas_price_tier: GasPriceTier,
    pub account_id: u32,
    pub nonce: u32,
}

pub fn generate_transaction_message_to_sign(
    raw_l2transaction: &RawL2Transaction,
    rollup_type_hash: &H256,
    sender_script_hash: &H256,
    receiver_script_hash: &H256,
) -> H256 {
    let mut hasher = new_blake2b();
    hasher.update(rollup_type_hash.as_bytes());
    hasher.update(sender_script_hash.as_bytes());
    hasher.update(receiver_script_hash.as_bytes());
    hasher.update(&raw_l2transaction.as_bytes());
    let mut digest = [0u8; 32];
    hasher.finalize(&mut digest);

    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(digest);
    let message: [u8; 32] = hasher.finalize().into();
    message.into()
}

/// Recoverable secp256k1 signature, recovery id normalized to 0 or 1.
pub fn eth_sign(msg: &H256, privkey: H256) -> Result<[u8; SIGNATURE_SIZE]> {
    let serialized = Privkey::from(privkey).sign_recoverable(msg)?.serialize();
    if serialized.len() != SIGNATURE_SIZE {
        return Err(anyhow!("unexpected signature size {}", serialized.len()));
    }
    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&serialized);
    if signature[64] >= 27 {
        signature[64] -= 27;
    }
    Ok(signature)
}

fn build_raw_l2transaction(
    caller: &AccountInfo,
    contract: &ContractAccountInfo,
    eth_tx: &EthTransaction,
    nonce: u32,
) -> RawL2Transaction {
    RawL2Transaction {
        from_id: caller.account_id,
        to_id: contract.account_id,
        nonce,
        args: eth_tx.to_polyjuice_args().as_bytes(),
    }
}

/// Signs the call with the caller's key and serializes it for
/// `poly_submitL2Transaction`.
pub fn build_send_transaction(
    rollup_type_hash: &H256,
    caller: &AccountInfo,
    contract: &ContractAccountInfo,
    eth_tx: &EthTransaction,
    nonce: u32,
) -> Result<Bytes> {
    let raw_l2transaction = build_raw_l2transaction(caller, contract, eth_tx, nonce);
    let message = generate_transaction_message_to_sign(
        &raw_l2transaction,
        rollup_type_hash,
        &caller.script_hash,
        &contract.script_hash,
    );
    let privkey = parse_private_key(&caller.account.private_key)?;
    let signature = eth_sign(&message, privkey)
        .map_err(|err| anyhow!("sign tx of {} failed: {}", caller.account.eth_address, err))?;
    let l2tx = L2Transaction {
        raw: raw_l2transaction,
        signature,
    };
    let tx = L2TransactionWithAddressMapping::new(l2tx, AddressMapping::default());
    Ok(tx.as_bytes())
}

/// Serializes an unsigned call for `poly_executeRawL2Transaction`.
pub fn build_call_transaction(
    caller: &AccountInfo,
    contract: &ContractAccountInfo,
    eth_tx: &EthTransaction,
    nonce: u32,
) -> Bytes {
    let raw_l2transaction = build_raw_l2transaction(caller, contract, eth_tx, nonce);
    RawL2TransactionWithAddressMapping::new(raw_l2transaction, AddressMapping::default())
        .as_bytes()
}
