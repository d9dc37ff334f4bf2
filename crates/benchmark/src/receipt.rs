use std::time::Duration;

use ckb_fixed_hash::H256;
use tokio::time::{self, Instant};

use crate::{
    error::ExecuteError,
    godwoken_rpc::{GodwokenRpcClient, TxReceipt},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ReceiptPoller {
    rpc_client: GodwokenRpcClient,
    interval: Duration,
    timeout: Duration,
}

impl ReceiptPoller {
    pub fn new(rpc_client: GodwokenRpcClient, interval: Duration, timeout: Duration) -> Self {
        Self {
            rpc_client,
            interval,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits for the receipt of `tx_hash`.
    ///
    /// A transaction without hash was never accepted and fails right away.
    /// Otherwise the receipt is queried at least once, then again every
    /// interval while the next query still fits in the timeout. Transient
    /// network errors are retried; any other rpc error ends the wait.
    pub async fn poll(&self, tx_hash: Option<H256>) -> Result<TxReceipt, ExecuteError> {
        let tx_hash = tx_hash.ok_or(ExecuteError::SubmissionFailed)?;
        let start = Instant::now();
        loop {
            time::sleep(self.interval).await;
            match self.rpc_client.get_transaction_receipt(&tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    log::warn!("query receipt of tx {:#x}: {}, retry", tx_hash, err);
                }
                Err(source) => return Err(ExecuteError::Rpc { tx_hash, source }),
            }
            if start.elapsed() + self.interval > self.timeout {
                return Err(ExecuteError::Timeout {
                    tx_hash,
                    timeout: self.timeout,
                });
            }
        }
    }
}
