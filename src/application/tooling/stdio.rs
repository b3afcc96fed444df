//! Stdio transport: the MCP server is a subprocess speaking one JSON-RPC
//! message per line on stdin/stdout. Server stderr is forwarded to the host
//! log.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::error::TransportError;
use super::rpc::{
    parse_response_line, PendingRequests, RequestIds, RpcRequest, METHOD_CALL_TOOL,
    METHOD_LIST_TOOLS,
};
use super::transport::{parse_tool_listing, ToolDescriptor, Transport, DEFAULT_REQUEST_TIMEOUT};

pub struct StdioTransport {
    inner: Arc<StdioInner>,
}

struct StdioInner {
    server: String,
    timeout: Duration,
    state: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: PendingRequests,
    ids: RequestIds,
}

impl StdioTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_timeout(server, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StdioInner {
                server: server.into(),
                timeout,
                state: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                pending: PendingRequests::default(),
                ids: RequestIds::default(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn start(&self, command: &str, args: &[String]) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            debug!(server = %self.inner.server, "stdio transport already started");
            return Ok(());
        }

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                TransportError::unavailable(
                    &self.inner.server,
                    format!("failed to spawn '{command}': {source}"),
                )
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::unavailable(&self.inner.server, "failed to capture server stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::unavailable(&self.inner.server, "failed to capture server stdout")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            TransportError::unavailable(&self.inner.server, "failed to capture server stderr")
        })?;

        *self.inner.writer.lock().await = Some(BufWriter::new(stdin));
        *state = Some(child);
        drop(state);

        let reader = Arc::clone(&self.inner);
        tokio::spawn(async move {
            reader.stdout_loop(stdout).await;
        });
        let logger = Arc::clone(&self.inner);
        tokio::spawn(async move {
            logger.stderr_loop(stderr).await;
        });

        debug!(server = %self.inner.server, command, "stdio transport started");
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let result = self
            .inner
            .send_request(METHOD_LIST_TOOLS, json!({}))
            .await?;
        parse_tool_listing(&self.inner.server, result)
    }

    async fn execute_tool(&self, tool_name: &str, input: Value) -> Result<Value, TransportError> {
        let params = json!({ "name": tool_name, "arguments": input });
        self.inner.send_request(METHOD_CALL_TOOL, params).await
    }

    async fn is_alive(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn stop(&self) {
        self.inner.shutdown().await;
    }
}

impl StdioInner {
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.ids.next();
        let rx = self.pending.register(id);

        if let Err(err) = self.write_line(&RpcRequest::new(id, method, params)).await {
            self.pending.forget(id);
            return Err(err);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::unavailable(
                &self.server,
                "connection closed before a response arrived",
            )),
            Err(_) => {
                self.pending.forget(id);
                Err(TransportError::Timeout {
                    server: self.server.clone(),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn write_line(&self, request: &RpcRequest<'_>) -> Result<(), TransportError> {
        let encoded = serde_json::to_string(request).map_err(|source| {
            TransportError::protocol(&self.server, format!("unencodable request: {source}"))
        })?;

        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or_else(|| {
            TransportError::unavailable(&self.server, "transport is not started")
        })?;
        for chunk in [encoded.as_bytes(), b"\n"] {
            stream.write_all(chunk).await.map_err(|source| {
                TransportError::unavailable(&self.server, format!("write failed: {source}"))
            })?;
        }
        stream.flush().await.map_err(|source| {
            TransportError::unavailable(&self.server, format!("flush failed: {source}"))
        })
    }

    async fn stdout_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(response) = parse_response_line(&self.server, &line) {
                self.pending.complete(&self.server, response);
            }
        }
        debug!(server = %self.server, "stdio stream closed");
        self.shutdown().await;
    }

    async fn stderr_loop(self: Arc<Self>, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                warn!(server = %self.server, line = %line, "MCP server stderr");
            }
        }
    }

    // Lock order matches start: state first, then writer.
    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut child) = state.take() {
            if let Err(err) = child.kill().await {
                debug!(server = %self.server, %err, "failed to kill MCP server process");
            }
            let _ = child.wait().await;
        }
        drop(state);

        *self.writer.lock().await = None;

        let server = self.server.clone();
        self.pending.fail_all(move || {
            TransportError::unavailable(&server, "transport stopped")
        });
    }
}
