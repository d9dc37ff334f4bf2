use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use ckb_fixed_hash::H256;
use ckb_jsonrpc_types::{JsonBytes, Uint128, Uint32, Uint64};
use jsonrpc_core::{Id, MethodCall, Output, Params, Version};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RpcError;

type AccountID = Uint32;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Carries one JSON-RPC payload, single call or batch, to the node.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, payload: Value) -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    url: reqwest::Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: reqwest::Url, timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, payload: Value) -> Result<Value, RpcError> {
        let resp = self
            .client
            .post(self.url.clone())
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        Ok(resp.json::<Value>().await?)
    }
}

/// Receipt returned by `eth_getTransactionReceipt` of the web3 endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub block_number: Option<Uint64>,
    #[serde(default)]
    pub gas_used: Option<Uint64>,
    #[serde(default)]
    pub status: Option<Uint64>,
}

/// Random `0x` prefixed 8 bytes hex id.
pub fn random_request_id() -> Id {
    let id: [u8; 8] = rand::random();
    Id::Str(format!("0x{}", hex::encode(id)))
}

fn method_call(method: &str, params: Vec<Value>) -> MethodCall {
    MethodCall {
        jsonrpc: Some(Version::V2),
        method: method.to_owned(),
        params: Params::Array(params),
        id: random_request_id(),
    }
}

fn to_result<T: DeserializeOwned>(method: &str, output: Output) -> Result<T, RpcError> {
    match output {
        Output::Success(success) => Ok(serde_json::from_value(success.result)?),
        Output::Failure(failure) => Err(RpcError::Response {
            method: method.to_owned(),
            error: failure.error,
        }),
    }
}

#[derive(Clone)]
pub struct GodwokenRpcClient {
    transport: Arc<dyn RpcTransport>,
}

impl GodwokenRpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> GodwokenRpcClient {
        GodwokenRpcClient { transport }
    }

    pub fn with_url(url: reqwest::Url, timeout: Option<Duration>) -> Result<GodwokenRpcClient> {
        let transport = HttpTransport::new(url, timeout)?;
        Ok(Self::new(Arc::new(transport)))
    }
}

impl GodwokenRpcClient {
    pub async fn get_account_id_by_script_hash(
        &self,
        script_hash: &H256,
    ) -> Result<Option<u32>, RpcError> {
        self.rpc::<Option<Uint32>>("gw_get_account_id_by_script_hash", vec![json!(script_hash)])
            .await
            .map(|opt| opt.map(Into::into))
    }

    pub async fn get_script_hash_by_short_address(
        &self,
        short_address: JsonBytes,
    ) -> Result<Option<H256>, RpcError> {
        self.rpc::<Option<H256>>(
            "gw_get_script_hash_by_short_address",
            vec![json!(short_address)],
        )
        .await
    }

    pub async fn get_nonce(&self, account_id: u32) -> Result<u32, RpcError> {
        self.rpc::<Uint32>("gw_get_nonce", vec![json!(AccountID::from(account_id))])
            .await
            .map(Into::into)
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        self.rpc::<Uint128>("eth_gasPrice", vec![])
            .await
            .map(Into::into)
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &H256,
    ) -> Result<Option<TxReceipt>, RpcError> {
        self.rpc::<Option<TxReceipt>>("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    /// One `poly_submitL2Transaction` per entry, sent as a single batch.
    pub async fn submit_l2transaction_batch(
        &self,
        l2txs: Vec<JsonBytes>,
    ) -> Result<Vec<Result<H256, RpcError>>, RpcError> {
        let params_list = l2txs.into_iter().map(|tx| vec![json!(tx)]).collect();
        self.batch_rpc("poly_submitL2Transaction", params_list)
            .await
    }

    /// One `poly_executeRawL2Transaction` per entry, sent as a single batch.
    pub async fn execute_raw_l2transaction_batch(
        &self,
        raw_l2txs: Vec<JsonBytes>,
    ) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        let params_list = raw_l2txs.into_iter().map(|tx| vec![json!(tx)]).collect();
        self.batch_rpc("poly_executeRawL2Transaction", params_list)
            .await
    }

    async fn rpc<SuccessResponse: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<SuccessResponse, RpcError> {
        let call = method_call(method, params);
        let resp = self.transport.send(serde_json::to_value(&call)?).await?;
        let output = serde_json::from_value::<Output>(resp)?;
        to_result(method, output)
    }

    /// Sends every params entry as one sub request of a single batch.
    ///
    /// The peer may answer a batch in any order, so outputs are matched back
    /// to their requests by id and returned in request order.
    async fn batch_rpc<SuccessResponse: DeserializeOwned>(
        &self,
        method: &str,
        params_list: Vec<Vec<Value>>,
    ) -> Result<Vec<Result<SuccessResponse, RpcError>>, RpcError> {
        if params_list.is_empty() {
            return Ok(Vec::new());
        }
        let calls: Vec<MethodCall> = params_list
            .into_iter()
            .map(|params| method_call(method, params))
            .collect();
        let positions: HashMap<Id, usize> = calls
            .iter()
            .enumerate()
            .map(|(idx, call)| (call.id.clone(), idx))
            .collect();
        let total = calls.len();

        let resp = self.transport.send(serde_json::to_value(&calls)?).await?;
        let outputs = match resp {
            Value::Array(outputs) => outputs,
            other => {
                return Err(RpcError::InvalidResponse(format!(
                    "expect batch response of {} entries, got: {}",
                    total, other
                )))
            }
        };

        let mut results: Vec<Option<Result<SuccessResponse, RpcError>>> =
            (0..total).map(|_| None).collect();
        for output in outputs {
            let output = match serde_json::from_value::<Output>(output) {
                Ok(output) => output,
                Err(err) => {
                    log::warn!("{} malformed response in batch: {}", method, err);
                    continue;
                }
            };
            match positions.get(output.id()) {
                Some(&idx) => results[idx] = Some(to_result(method, output)),
                None => log::warn!("{} response with unknown id: {:?}", method, output.id()),
            }
        }

        Ok(results
            .into_iter()
            .map(|res| {
                res.unwrap_or_else(|| {
                    Err(RpcError::InvalidResponse(format!(
                        "missing {} response in batch",
                        method
                    )))
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTransport, Reply};

    #[test]
    fn test_random_request_id_format() {
        match random_request_id() {
            Id::Str(id) => {
                assert!(id.starts_with("0x"));
                assert_eq!(id.len(), 18);
            }
            other => panic!("unexpected id: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_responses_are_matched_by_id() {
        let transport = MockTransport::new(|_method, params| {
            Reply::Result(params[0].clone())
        })
        .with_reversed_batches();
        let client = GodwokenRpcClient::new(Arc::new(transport));
        let params_list = (0..5u32).map(|i| vec![json!(i)]).collect();
        let results = client
            .batch_rpc::<u32>("echo", params_list)
            .await
            .expect("batch");
        let values: Vec<u32> = results.into_iter().map(|r| r.expect("echo")).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_malformed_entry_only_fails_its_position() {
        let transport = MockTransport::new(|_method, params| {
            if params[0] == json!(1) {
                Reply::Malformed
            } else {
                Reply::Result(params[0].clone())
            }
        });
        let client = GodwokenRpcClient::new(Arc::new(transport));
        let params_list = (0..3u32).map(|i| vec![json!(i)]).collect();
        let results = client
            .batch_rpc::<u32>("echo", params_list)
            .await
            .expect("batch");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().ok(), Some(&0));
        assert!(matches!(results[1], Err(RpcError::InvalidResponse(_))));
        assert_eq!(results[2].as_ref().ok(), Some(&2));
    }

    #[tokio::test]
    async fn test_single_rpc_failure_is_typed() {
        let transport = MockTransport::new(|_method, _params| Reply::Error(-32000, "nope".into()));
        let client = GodwokenRpcClient::new(Arc::new(transport));
        let err = client.get_nonce(3).await.unwrap_err();
        match err {
            RpcError::Response { method, error } => {
                assert_eq!(method, "gw_get_nonce");
                assert_eq!(error.message, "nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hex_number_results() {
        let transport = MockTransport::new(|method, _params| match method {
            "gw_get_account_id_by_script_hash" => Reply::Result(json!("0x10")),
            "eth_gasPrice" => Reply::Result(json!("0x3e8")),
            _ => Reply::Result(Value::Null),
        });
        let client = GodwokenRpcClient::new(Arc::new(transport));
        let account_id = client
            .get_account_id_by_script_hash(&H256::default())
            .await
            .expect("account id");
        assert_eq!(account_id, Some(16));
        assert_eq!(client.gas_price().await.expect("gas price"), 1000);
        let receipt = client
            .get_transaction_receipt(&H256::default())
            .await
            .expect("receipt");
        assert!(receipt.is_none());
    }
}
