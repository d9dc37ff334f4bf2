use std::{cmp, future::Future};

use bytes::Bytes;
use ckb_fixed_hash::H256;
use ckb_jsonrpc_types::JsonBytes;
use futures::future::join_all;
use tokio::time::Instant;

use crate::godwoken_rpc::GodwokenRpcClient;

pub const DEFAULT_DISPATCH_CHUNK_SIZE: usize = 20;

/// Runs `execute` over consecutive chunks of `data`, one chunk at a time.
pub async fn batch_execute<T, K, F, Fut>(
    name: &str,
    data: Vec<T>,
    chunk_size: usize,
    mut execute: F,
) -> Vec<K>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Vec<K>>,
{
    let chunk_size = cmp::max(chunk_size, 1);
    let mut result = Vec::with_capacity(data.len());
    let mut data = data.into_iter().peekable();
    while data.peek().is_some() {
        let chunk: Vec<T> = data.by_ref().take(chunk_size).collect();
        result.extend(execute(chunk).await);
    }
    log::info!("batch execute {}, result size: {}", name, result.len());
    result
}

/// Outcome of one submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub tx_hash: Option<H256>,
    /// When the batch carrying the transaction was answered.
    pub submitted_at: Instant,
}

#[derive(Clone)]
pub struct BatchDispatcher {
    rpc_client: GodwokenRpcClient,
    chunk_size: usize,
}

impl BatchDispatcher {
    pub fn new(rpc_client: GodwokenRpcClient, chunk_size: usize) -> Self {
        Self {
            rpc_client,
            chunk_size: cmp::max(chunk_size, 1),
        }
    }

    /// Submits all transactions as one batch.
    ///
    /// A rejected entry yields `None` at its position; if the batch call itself
    /// fails every position is `None`.
    pub async fn submit_batch(&self, txs: Vec<Bytes>) -> Vec<Option<H256>> {
        let total = txs.len();
        if total == 0 {
            return Vec::new();
        }
        let l2txs = txs.into_iter().map(JsonBytes::from_bytes).collect();
        log::info!("send {} batch transaction", total);
        let results = match self.rpc_client.submit_l2transaction_batch(l2txs).await {
            Ok(results) => results,
            Err(err) => {
                log::error!("failed to send batch of {} transactions: {}", total, err);
                return vec![None; total];
            }
        };
        let tx_hashes: Vec<Option<H256>> = results
            .into_iter()
            .map(|res| match res {
                Ok(tx_hash) => Some(tx_hash),
                Err(err) => {
                    log::warn!("submit l2 tx with error: {}", err);
                    None
                }
            })
            .collect();
        let success = tx_hashes.iter().filter(|h| h.is_some()).count();
        log::info!("({}/{})", success, total);
        tx_hashes
    }

    /// Splits `txs` into chunks of `chunk_size`, submits the chunks
    /// concurrently and returns the hashes in input order.
    pub async fn submit_all(&self, txs: Vec<Bytes>) -> Vec<Option<H256>> {
        self.submit_all_timed(txs)
            .await
            .into_iter()
            .map(|s| s.tx_hash)
            .collect()
    }

    pub async fn submit_all_timed(&self, txs: Vec<Bytes>) -> Vec<Submission> {
        let chunks: Vec<Vec<Bytes>> = txs
            .chunks(self.chunk_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let futures = chunks.into_iter().map(|chunk| async move {
            let tx_hashes = self.submit_batch(chunk).await;
            let submitted_at = Instant::now();
            tx_hashes
                .into_iter()
                .map(|tx_hash| Submission {
                    tx_hash,
                    submitted_at,
                })
                .collect::<Vec<_>>()
        });
        let submissions: Vec<Submission> = join_all(futures).await.into_iter().flatten().collect();
        let success = submissions.iter().filter(|s| s.tx_hash.is_some()).count();
        log::info!(
            "submitted {} transactions, success: {}, failure: {}",
            submissions.len(),
            success,
            submissions.len() - success
        );
        submissions
    }
}
