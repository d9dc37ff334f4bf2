use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    account::{
        hex_address, resolve_accounts, Account, AccountInfo, ContractAccountInfo, RollupContext,
    },
    batch::{batch_execute, BatchDispatcher, Submission, DEFAULT_DISPATCH_CHUNK_SIZE},
    error::ExecuteError,
    fee::{erc20_transfer_data, tier_for_index, GasPriceTier, GasPriceTiers},
    godwoken_rpc::{GodwokenRpcClient, TxReceipt},
    receipt::{ReceiptPoller, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT},
    tx::{build_send_transaction, EthTransaction, SignedTransaction, DEFAULT_GAS_LIMIT},
};

pub const DEFAULT_RESOLVE_CHUNK_SIZE: usize = 120;

#[derive(Debug)]
pub struct ExecuteResult {
    pub receipt: TxReceipt,
    pub gas_price: u128,
    pub gas_price_tier: GasPriceTier,
    /// From the answer of the submission batch to the receipt.
    pub execute_time_millis: u128,
    pub account_id: u32,
    pub nonce: u32,
}

#[derive(Debug)]
pub struct ExecuteFailure {
    pub gas_price: u128,
    pub gas_price_tier: GasPriceTier,
    pub account_id: u32,
    pub nonce: u32,
    pub reason: ExecuteError,
}

#[derive(Debug)]
pub enum SettledResult {
    Fulfilled(ExecuteResult),
    Rejected(ExecuteFailure),
}

impl SettledResult {
    pub fn gas_price_tier(&self) -> GasPriceTier {
        match self {
            SettledResult::Fulfilled(res) => res.gas_price_tier,
            SettledResult::Rejected(failure) => failure.gas_price_tier,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, SettledResult::Fulfilled(_))
    }
}

/// What a settled result needs to know about its transaction.
#[derive(Clone, Copy, Debug)]
struct TxMeta {
    gas_price: u128,
    gas_price_tier: GasPriceTier,
    account_id: u32,
    nonce: u32,
}

impl TxMeta {
    fn of(tx: &SignedTransaction) -> Self {
        Self {
            gas_price: tx.gas_price,
            gas_price_tier: tx.gas_price_tier,
            account_id: tx.account_id,
            nonce: tx.nonce,
        }
    }

    fn reject(self, reason: ExecuteError) -> SettledResult {
        log::warn!(
            "tx of account {} nonce {} ({} tier) failed: {}",
            self.account_id,
            self.nonce,
            self.gas_price_tier,
            reason
        );
        SettledResult::Rejected(ExecuteFailure {
            gas_price: self.gas_price,
            gas_price_tier: self.gas_price_tier,
            account_id: self.account_id,
            nonce: self.nonce,
            reason,
        })
    }

    fn settle(
        self,
        submitted_at: Instant,
        res: Result<TxReceipt, ExecuteError>,
    ) -> SettledResult {
        match res {
            Ok(receipt) => SettledResult::Fulfilled(ExecuteResult {
                receipt,
                gas_price: self.gas_price,
                gas_price_tier: self.gas_price_tier,
                execute_time_millis: submitted_at.elapsed().as_millis(),
                account_id: self.account_id,
                nonce: self.nonce,
            }),
            Err(reason) => self.reject(reason),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlanConfig {
    pub resolve_chunk_size: usize,
    pub dispatch_chunk_size: usize,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            resolve_chunk_size: DEFAULT_RESOLVE_CHUNK_SIZE,
            dispatch_chunk_size: DEFAULT_DISPATCH_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Sends one ERC20 transfer per account, each account at its round-robin gas
/// price tier, and waits for every receipt.
pub struct FeePlan {
    rpc_client: GodwokenRpcClient,
    rollup: RollupContext,
    contract: ContractAccountInfo,
    tiers: GasPriceTiers,
    resolve_chunk_size: usize,
    dispatcher: BatchDispatcher,
    poller: ReceiptPoller,
}

impl FeePlan {
    pub fn new(
        rpc_client: GodwokenRpcClient,
        rollup: RollupContext,
        contract: ContractAccountInfo,
        tiers: GasPriceTiers,
        config: PlanConfig,
    ) -> Self {
        let dispatcher = BatchDispatcher::new(rpc_client.clone(), config.dispatch_chunk_size);
        let poller = ReceiptPoller::new(
            rpc_client.clone(),
            config.poll_interval,
            config.poll_timeout,
        );
        Self {
            rpc_client,
            rollup,
            contract,
            tiers,
            resolve_chunk_size: config.resolve_chunk_size,
            dispatcher,
            poller,
        }
    }

    pub async fn run(&self, accounts: Vec<Account>) -> Result<Vec<SettledResult>> {
        if accounts.is_empty() {
            bail!("zero test accounts");
        }
        log::info!("fee plan running with {} accounts", accounts.len());
        log::info!(
            "gas price tiers, low: {}, even: {}, high: {}",
            self.tiers.low,
            self.tiers.even,
            self.tiers.high
        );

        let infos = resolve_accounts(
            &self.rpc_client,
            &self.rollup,
            accounts,
            self.resolve_chunk_size,
        )
        .await;
        if infos.is_empty() {
            bail!("none of the test accounts is resolved");
        }

        Ok(self.execute(infos).await)
    }

    /// Sends `rounds` rows one after another. A row is one transfer from each
    /// of the first three accounts, at the low, even and high tier, and the
    /// next row starts once every transaction of the previous one settled.
    pub async fn run_rounds(
        &self,
        accounts: Vec<Account>,
        rounds: usize,
    ) -> Result<Vec<SettledResult>> {
        let row_size = GasPriceTier::ALL.len();
        if accounts.len() < row_size {
            bail!(
                "need at least {} test accounts, got {}",
                row_size,
                accounts.len()
            );
        }
        let accounts: Vec<Account> = accounts.into_iter().take(row_size).collect();
        let infos = resolve_accounts(
            &self.rpc_client,
            &self.rollup,
            accounts,
            self.resolve_chunk_size,
        )
        .await;
        if infos.len() < row_size {
            bail!(
                "only {} of the {} row accounts are resolved",
                infos.len(),
                row_size
            );
        }

        let mut results = Vec::with_capacity(rounds * row_size);
        for row in 0..rounds {
            log::info!("=== start {}th row ===", row + 1);
            results.extend(self.execute(infos.clone()).await);
        }
        Ok(results)
    }

    /// Builds, submits and waits for one transfer per account.
    async fn execute(&self, infos: Vec<AccountInfo>) -> Vec<SettledResult> {
        let txs = self.build_transactions(infos).await;
        log::info!("built {} transactions", txs.len());

        let submissions = self
            .dispatcher
            .submit_all_timed(txs.iter().map(|tx| tx.serialized.clone()).collect())
            .await;

        let tasks = txs
            .iter()
            .zip(submissions)
            .map(|(tx, submission)| {
                let meta = TxMeta::of(tx);
                (meta, self.spawn_poll_task(meta, submission))
            })
            .collect();
        collect_settled(tasks).await
    }

    fn spawn_poll_task(&self, meta: TxMeta, submission: Submission) -> JoinHandle<SettledResult> {
        let poller = self.poller.clone();
        tokio::spawn(async move {
            let Submission {
                tx_hash,
                submitted_at,
            } = submission;
            let res = poller.poll(tx_hash).await;
            meta.settle(submitted_at, res)
        })
    }

    /// Builds the transfer of every account. Accounts that fail to build are
    /// logged and skipped.
    async fn build_transactions(&self, infos: Vec<AccountInfo>) -> Vec<SignedTransaction> {
        let indexed: Vec<(usize, AccountInfo)> = infos.into_iter().enumerate().collect();
        batch_execute(
            "build_transactions",
            indexed,
            self.resolve_chunk_size,
            |chunk| async move {
                let futures = chunk.into_iter().map(|(idx, info)| async move {
                    let tier = tier_for_index(idx);
                    match self.build_transfer(&info, tier).await {
                        Ok(tx) => Some(tx),
                        Err(err) => {
                            log::warn!(
                                "account {} ({} tier) prepare tx failed, err: {}",
                                info.account.eth_address,
                                tier,
                                err
                            );
                            None
                        }
                    }
                });
                join_all(futures)
                    .await
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
            },
        )
        .await
    }

    async fn build_transfer(
        &self,
        info: &AccountInfo,
        tier: GasPriceTier,
    ) -> Result<SignedTransaction> {
        let gas_price = self.tiers.price(tier);
        let eth_tx = EthTransaction {
            from: info.eth_address,
            to: self.contract.address,
            data: erc20_transfer_data(&info.eth_address, 1),
            gas_price,
            gas: DEFAULT_GAS_LIMIT,
            value: 0,
        };
        let nonce = self.rpc_client.get_nonce(info.account_id).await?;
        let serialized = build_send_transaction(
            &self.rollup.rollup_type_hash,
            info,
            &self.contract,
            &eth_tx,
            nonce,
        )?;
        log::debug!(
            "build tx of {} to {}, nonce: {}, gas price: {}",
            info.account.eth_address,
            hex_address(&self.contract.address),
            nonce,
            gas_price
        );
        Ok(SignedTransaction {
            serialized,
            gas_price,
            gas_price_tier: tier,
            account_id: info.account_id,
            nonce,
        })
    }
}

/// Awaits every task. A task that panicked or was cancelled settles as a
/// rejection of its transaction.
async fn collect_settled(tasks: Vec<(TxMeta, JoinHandle<SettledResult>)>) -> Vec<SettledResult> {
    let futures = tasks.into_iter().map(|(meta, handle)| async move {
        match handle.await {
            Ok(settled) => settled,
            Err(join_err) => meta.reject(ExecuteError::Aborted(join_err.to_string())),
        }
    });
    join_all(futures).await
}
