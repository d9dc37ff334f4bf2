use std::{fmt, time::Duration};

use ckb_fixed_hash::H256;
use thiserror::Error;

/// Network failures the receipt poller is allowed to ride out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransientKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Dns,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransientKind::ConnectionRefused => "connection refused",
            TransientKind::ConnectionReset => "connection reset",
            TransientKind::Timeout => "timed out",
            TransientKind::Dns => "dns failure",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transient network error ({kind}): {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("JSONRPC error, method: {method}, error: {error}")]
    Response {
        method: String,
        error: jsonrpc_core::Error,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl RpcError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transient { .. })
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        match classify_transient(&err) {
            Some(kind) => RpcError::Transient {
                kind,
                message: err.to_string(),
            },
            None => RpcError::Http(err.to_string()),
        }
    }
}

fn classify_transient(err: &reqwest::Error) -> Option<TransientKind> {
    if err.is_timeout() {
        return Some(TransientKind::Timeout);
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<std::io::Error>() {
            match io_err.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return Some(TransientKind::ConnectionRefused)
                }
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                    return Some(TransientKind::ConnectionReset)
                }
                std::io::ErrorKind::TimedOut => return Some(TransientKind::Timeout),
                _ => {}
            }
        }
        // hyper reports resolver failures only through its message
        if inner.to_string().contains("dns error") {
            return Some(TransientKind::Dns);
        }
        source = inner.source();
    }
    if err.is_connect() {
        return Some(TransientKind::ConnectionRefused);
    }
    None
}

/// Terminal failure of one benchmark transaction.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("transaction was not accepted by the batch submission")]
    SubmissionFailed,

    #[error("wait receipt of tx 0x{tx_hash:x} timeout in {} milliseconds", .timeout.as_millis())]
    Timeout { tx_hash: H256, timeout: Duration },

    #[error("query receipt of tx 0x{tx_hash:x} failed: {source}")]
    Rpc {
        tx_hash: H256,
        #[source]
        source: RpcError,
    },

    #[error("receipt polling task aborted: {0}")]
    Aborted(String),
}
