//! JSON-RPC envelope types and request/response correlation shared by the
//! transports. Request ids increase monotonically per transport; responses
//! carrying an id nobody is waiting on are discarded with a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use super::error::TransportError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_LIST_TOOLS: &str = "list_tools";
pub const METHOD_CALL_TOOL: &str = "call_tool";

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default = "default_error_code")]
    pub code: i64,
    #[serde(default = "default_error_message")]
    pub message: String,
}

fn default_error_code() -> i64 {
    -32000
}

fn default_error_message() -> String {
    "unknown error".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    /// Numeric id of the response, if it carries one.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    pub fn into_result(self, server: &str) -> Result<Value, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Remote {
                server: server.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Per-transport monotonically increasing request ids, starting at 1.
#[derive(Debug, Default)]
pub struct RequestIds {
    counter: AtomicU64,
}

impl RequestIds {
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

type Responder = oneshot::Sender<Result<Value, TransportError>>;

/// Outstanding requests awaiting a correlated response. Shared by the stdio
/// and SSE transports, whose responses arrive on a single inbound stream.
#[derive(Default)]
pub struct PendingRequests {
    map: Mutex<HashMap<u64, Responder>>,
}

impl PendingRequests {
    pub fn register(&self, id: u64) -> oneshot::Receiver<Result<Value, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.map.lock().expect("pending request lock").insert(id, tx);
        rx
    }

    pub fn forget(&self, id: u64) {
        self.map.lock().expect("pending request lock").remove(&id);
    }

    /// Deliver a response to its waiter. Returns false for stray ids.
    pub fn complete(&self, server: &str, response: RpcResponse) -> bool {
        let Some(id) = response.numeric_id() else {
            warn!(server, "discarding response without a numeric id");
            return false;
        };
        let responder = self.map.lock().expect("pending request lock").remove(&id);
        match responder {
            Some(tx) => {
                let _ = tx.send(response.into_result(server));
                true
            }
            None => {
                warn!(server, response_id = id, "discarding response for unknown request");
                false
            }
        }
    }

    /// Fail every outstanding request, e.g. when the connection drops.
    pub fn fail_all(&self, make_error: impl Fn() -> TransportError) {
        let mut map = self.map.lock().expect("pending request lock");
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(make_error()));
        }
    }
}

/// Parse one inbound line as a JSON-RPC response. Non-JSON lines and
/// request/notification frames yield `None`.
pub fn parse_response_line(server: &str, line: &str) -> Option<RpcResponse> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<RpcResponse>(trimmed) {
        Ok(response) if response.id.is_some() || response.error.is_some() => Some(response),
        Ok(_) => None,
        Err(source) => {
            warn!(server, line = trimmed, %source, "received invalid JSON from MCP server");
            None
        }
    }
}
