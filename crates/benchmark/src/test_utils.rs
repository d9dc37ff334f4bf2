use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    error::{RpcError, TransientKind},
    godwoken_rpc::RpcTransport,
};

pub(crate) enum Reply {
    Result(Value),
    Error(i64, String),
    /// Neither `result` nor `error`.
    Malformed,
    Transient,
}

type Handler = Box<dyn Fn(&str, &[Value]) -> Reply + Send + Sync>;

/// In-memory JSON-RPC peer answering every call through `handler`.
pub(crate) struct MockTransport {
    handler: Handler,
    reverse_batches: bool,
    calls: Mutex<HashMap<String, usize>>,
    batches: Mutex<Vec<usize>>,
    sends: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Reply + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            reverse_batches: false,
            calls: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            sends: AtomicUsize::new(0),
        }
    }

    /// Answers batches in reverse order.
    pub(crate) fn with_reversed_batches(mut self) -> Self {
        self.reverse_batches = true;
        self
    }

    pub(crate) fn calls(&self, method: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.get(method).copied().unwrap_or_default()
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &Value) -> Result<Value, RpcError> {
        let method = call["method"].as_str().unwrap_or_default().to_owned();
        let params = call["params"].as_array().cloned().unwrap_or_default();
        let id = call["id"].clone();
        *self.calls.lock().unwrap().entry(method.clone()).or_default() += 1;
        match (self.handler)(&method, &params) {
            Reply::Result(result) => Ok(json!({"jsonrpc": "2.0", "result": result, "id": id})),
            Reply::Error(code, message) => Ok(json!({
                "jsonrpc": "2.0",
                "error": {"code": code, "message": message},
                "id": id,
            })),
            Reply::Malformed => Ok(json!({"jsonrpc": "2.0", "id": id})),
            Reply::Transient => Err(RpcError::Transient {
                kind: TransientKind::ConnectionRefused,
                message: "connect ECONNREFUSED".to_owned(),
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn send(&self, payload: Value) -> Result<Value, RpcError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        match payload {
            Value::Array(calls) => {
                self.batches.lock().unwrap().push(calls.len());
                let mut outputs = calls
                    .iter()
                    .map(|call| self.answer(call))
                    .collect::<Result<Vec<_>, _>>()?;
                if self.reverse_batches {
                    outputs.reverse();
                }
                Ok(Value::Array(outputs))
            }
            call => self.answer(&call),
        }
    }
}
