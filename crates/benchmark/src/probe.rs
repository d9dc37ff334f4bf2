use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use ckb_jsonrpc_types::JsonBytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    account::{AccountInfo, ContractAccountInfo},
    batch::batch_execute,
    fee::{erc20_balance_of_data, erc20_call_data, WRONG_BALANCE_OF_SELECTOR},
    godwoken_rpc::GodwokenRpcClient,
    tx::{build_call_transaction, EthTransaction, DEFAULT_GAS_LIMIT},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub duplicate_count: usize,
    pub wrong_duplicate_count: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            duplicate_count: 1000,
            wrong_duplicate_count: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseSummary {
    pub name: &'static str,
    pub success: usize,
    pub failure: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSummary {
    pub phases: Vec<PhaseSummary>,
}

/// Read-only `balanceOf` calls against `poly_executeRawL2Transaction`.
pub struct CallProbe {
    rpc_client: GodwokenRpcClient,
    contract: ContractAccountInfo,
    chunk_size: usize,
    config: ProbeConfig,
}

impl CallProbe {
    pub fn new(
        rpc_client: GodwokenRpcClient,
        contract: ContractAccountInfo,
        chunk_size: usize,
        config: ProbeConfig,
    ) -> Self {
        Self {
            rpc_client,
            contract,
            chunk_size,
            config,
        }
    }

    pub async fn run(&self, infos: Vec<AccountInfo>) -> Result<ProbeSummary> {
        let first = match infos.first() {
            Some(info) => info.clone(),
            None => bail!("zero test accounts"),
        };

        let unique_calls = batch_execute(
            "prepare_balance_of_calls",
            infos,
            self.chunk_size,
            |chunk| async move {
                let futures = chunk.into_iter().map(|info| async move {
                    let data = erc20_balance_of_data(&info.polyjuice_address);
                    self.prepare_call(&info, data).await
                });
                join_all(futures)
                    .await
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
            },
        )
        .await;
        let duplicate_call = match unique_calls.first() {
            Some(call) => call.clone(),
            None => bail!("no balanceOf call prepared"),
        };

        let mut phases = Vec::with_capacity(3);
        log::info!("send unique correct call balanceOf");
        phases.push(self.send_all("unique_balance_of", unique_calls).await);

        log::info!("send duplicate correct call balanceOf");
        let duplicates = vec![duplicate_call; self.config.duplicate_count];
        phases.push(self.send_all("duplicate_balance_of", duplicates).await);

        log::info!("send duplicate wrong call balanceOf");
        let wrong_data = erc20_call_data(WRONG_BALANCE_OF_SELECTOR, &first.polyjuice_address);
        let wrong_call = self
            .prepare_call(&first, wrong_data)
            .await
            .ok_or_else(|| anyhow!("no wrong balanceOf call prepared"))?;
        let wrong_duplicates = vec![wrong_call; self.config.wrong_duplicate_count];
        phases.push(
            self.send_all("duplicate_wrong_balance_of", wrong_duplicates)
                .await,
        );

        Ok(ProbeSummary { phases })
    }

    async fn prepare_call(&self, info: &AccountInfo, data: Bytes) -> Option<Bytes> {
        let eth_tx = EthTransaction {
            from: info.eth_address,
            to: self.contract.address,
            data,
            gas_price: 0,
            gas: DEFAULT_GAS_LIMIT,
            value: 0,
        };
        match self.rpc_client.get_nonce(info.account_id).await {
            Ok(nonce) => Some(build_call_transaction(info, &self.contract, &eth_tx, nonce)),
            Err(err) => {
                log::warn!(
                    "account {} prepare raw tx failed, err: {}",
                    info.account.eth_address,
                    err
                );
                None
            }
        }
    }

    /// Sends every call as its own single entry batch.
    async fn send_all(&self, name: &'static str, calls: Vec<Bytes>) -> PhaseSummary {
        let outcomes = batch_execute(name, calls, self.chunk_size, |chunk| async move {
            let futures = chunk.into_iter().map(|call| async move {
                let res = self
                    .rpc_client
                    .execute_raw_l2transaction_batch(vec![JsonBytes::from_bytes(call)])
                    .await;
                match res {
                    Ok(mut results) => match results.pop() {
                        Some(Ok(_)) => true,
                        Some(Err(err)) => {
                            log::debug!("{} call failed: {}", name, err);
                            false
                        }
                        None => false,
                    },
                    Err(err) => {
                        log::warn!("{} request failed: {}", name, err);
                        false
                    }
                }
            });
            join_all(futures).await
        })
        .await;
        let success = outcomes.iter().filter(|ok| **ok).count();
        let summary = PhaseSummary {
            name,
            success,
            failure: outcomes.len() - success,
        };
        log::info!("{}: {:?}", name, summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        test_utils::{MockTransport, Reply},
        tx::tests::{test_account_info, test_contract},
    };

    #[tokio::test]
    async fn test_probe_phases() {
        let transport = Arc::new(MockTransport::new(|method, params| match method {
            "gw_get_nonce" => Reply::Result(json!("0x1")),
            "poly_executeRawL2Transaction" => {
                let raw_tx = params[0].as_str().unwrap_or_default();
                if raw_tx.contains(&hex::encode(WRONG_BALANCE_OF_SELECTOR)) {
                    Reply::Error(-32000, "revert".into())
                } else {
                    Reply::Result(json!({"status_code": "0x0", "return_data": "0x01"}))
                }
            }
            _ => Reply::Error(-32601, "method not found".into()),
        }));
        let probe = CallProbe::new(
            GodwokenRpcClient::new(transport.clone()),
            test_contract(),
            4,
            ProbeConfig {
                duplicate_count: 5,
                wrong_duplicate_count: 4,
            },
        );
        let infos = (1..=3).map(|seed| test_account_info(seed, seed as u32)).collect();
        let summary = probe.run(infos).await.expect("probe");
        assert_eq!(
            summary.phases,
            vec![
                PhaseSummary {
                    name: "unique_balance_of",
                    success: 3,
                    failure: 0
                },
                PhaseSummary {
                    name: "duplicate_balance_of",
                    success: 5,
                    failure: 0
                },
                PhaseSummary {
                    name: "duplicate_wrong_balance_of",
                    success: 0,
                    failure: 4
                },
            ]
        );
        assert_eq!(transport.calls("poly_executeRawL2Transaction"), 12);
        assert!(transport.batch_sizes().iter().all(|size| *size == 1));
    }

    #[tokio::test]
    async fn test_probe_without_accounts() {
        let transport = Arc::new(MockTransport::new(|_method, _params| {
            Reply::Result(json!("0x0"))
        }));
        let probe = CallProbe::new(
            GodwokenRpcClient::new(transport.clone()),
            test_contract(),
            4,
            ProbeConfig::default(),
        );
        assert!(probe.run(Vec::new()).await.is_err());
        assert_eq!(transport.sends(), 0);
    }
}
