//! HTTP-stream transport: each JSON-RPC request is POSTed to the server and
//! answered with a newline-delimited JSON stream, consumed until the response
//! with the matching id is observed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::error::TransportError;
use super::rpc::{
    parse_response_line, RequestIds, RpcRequest, METHOD_CALL_TOOL, METHOD_LIST_TOOLS,
};
use super::transport::{parse_tool_listing, ToolDescriptor, Transport, DEFAULT_REQUEST_TIMEOUT};

pub struct HttpStreamTransport {
    inner: Arc<HttpInner>,
}

struct HttpInner {
    server: String,
    timeout: Duration,
    http: reqwest::Client,
    endpoint: AsyncMutex<Option<String>>,
    ids: RequestIds,
}

impl HttpStreamTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_timeout(server, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HttpInner {
                server: server.into(),
                timeout,
                http: reqwest::Client::new(),
                endpoint: AsyncMutex::new(None),
                ids: RequestIds::default(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpStreamTransport {
    async fn start(&self, _command: &str, args: &[String]) -> Result<(), TransportError> {
        let mut endpoint = self.inner.endpoint.lock().await;
        if endpoint.is_some() {
            debug!(server = %self.inner.server, "http-stream transport already started");
            return Ok(());
        }

        let base_url = args.first().ok_or_else(|| {
            TransportError::unavailable(
                &self.inner.server,
                "http-stream transport requires the server URL as the first argument",
            )
        })?;
        let base_url = base_url.trim_end_matches('/').to_string();

        self.inner.health_check(&base_url).await?;
        *endpoint = Some(base_url);
        debug!(server = %self.inner.server, "http-stream transport started");
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
        self.inner.endpoint.lock().await.is_some()
    }

    async fn stop(&self) {
        *self.inner.endpoint.lock().await = None;
    }
}

impl HttpInner {
    async fn health_check(&self, base_url: &str) -> Result<(), TransportError> {
        let url = format!("{base_url}/health");
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| {
                TransportError::unavailable(&self.server, format!("health check failed: {source}"))
            })?;
        if !response.status().is_success() {
            return Err(TransportError::unavailable(
                &self.server,
                format!("health check returned HTTP {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let base_url = self
            .endpoint
            .lock()
            .await
            .clone()
            .ok_or_else(|| TransportError::unavailable(&self.server, "transport is not started"))?;

        let id = self.ids.next();
        let exchange = self.exchange(&base_url, id, method, params);
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                server: self.server.clone(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    /// POST one request and scan the response stream for the matching id.
    /// Responses for other ids are discarded with a warning.
    async fn exchange(
        &self,
        base_url: &str,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<Value, TransportError> {
        let url = format!("{base_url}/rpc");
        let response = self
            .http
            .post(&url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|source| {
                TransportError::unavailable(&self.server, format!("request failed: {source}"))
            })?;

        if !response.status().is_success() {
            return Err(TransportError::unavailable(
                &self.server,
                format!("server returned HTTP {}", response.status()),
            ));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| {
                TransportError::unavailable(&self.server, format!("stream read failed: {source}"))
            })?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                if let Some(value) = self.match_line(id, &line) {
                    return value;
                }
            }
        }
        // Trailing line without a newline terminator.
        if let Some(value) = self.match_line(id, &buffer) {
            return value;
        }

        Err(TransportError::protocol(
            &self.server,
            format!("response stream ended without a response for request {id}"),
        ))
    }

    fn match_line(&self, id: u64, line: &str) -> Option<Result<Value, TransportError>> {
        let response = parse_response_line(&self.server, line)?;
        if response.numeric_id() == Some(id) {
            return Some(response.into_result(&self.server));
        }
        warn!(
            server = %self.server,
            response_id = ?response.numeric_id(),
            expected = id,
            "discarding response for unknown request"
        );
        None
    }
}
