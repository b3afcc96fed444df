//! SSE transport: requests go out as POSTs to a companion endpoint, responses
//! come back as `data:` events on one long-lived GET stream. The pending map
//! correlates them by id, so out-of-order responses are handled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::TransportError;
use super::rpc::{
    parse_response_line, PendingRequests, RequestIds, RpcRequest, METHOD_CALL_TOOL,
    METHOD_LIST_TOOLS,
};
use super::transport::{parse_tool_listing, ToolDescriptor, Transport, DEFAULT_REQUEST_TIMEOUT};

pub struct SseTransport {
    inner: Arc<SseInner>,
}

struct SseInner {
    server: String,
    timeout: Duration,
    http: reqwest::Client,
    endpoint: AsyncMutex<Option<String>>,
    reader: AsyncMutex<Option<JoinHandle<()>>>,
    pending: PendingRequests,
    ids: RequestIds,
}

impl SseTransport {
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_timeout(server, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SseInner {
                server: server.into(),
                timeout,
                http: reqwest::Client::new(),
                endpoint: AsyncMutex::new(None),
                reader: AsyncMutex::new(None),
                pending: PendingRequests::default(),
                ids: RequestIds::default(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn start(&self, _command: &str, args: &[String]) -> Result<(), TransportError> {
        let mut endpoint = self.inner.endpoint.lock().await;
        if endpoint.is_some() {
            debug!(server = %self.inner.server, "sse transport already started");
            return Ok(());
        }

        let base_url = args.first().ok_or_else(|| {
            TransportError::unavailable(
                &self.inner.server,
                "sse transport requires the server URL as the first argument",
            )
        })?;
        let base_url = base_url.trim_end_matches('/').to_string();

        self.inner.health_check(&base_url).await?;

        let events_url = format!("{base_url}/events");
        let response = self
            .inner
            .http
            .get(&events_url)
            .send()
            .await
            .map_err(|source| {
                TransportError::unavailable(
                    &self.inner.server,
                    format!("failed to open event stream: {source}"),
                )
            })?;
        if !response.status().is_success() {
            return Err(TransportError::unavailable(
                &self.inner.server,
                format!("event stream returned HTTP {}", response.status()),
            ));
        }

        let reader_inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            reader_inner.event_loop(response).await;
        });
        *self.inner.reader.lock().await = Some(handle);
        *endpoint = Some(base_url);
        debug!(server = %self.inner.server, "sse transport started");
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
        if let Some(handle) = self.inner.reader.lock().await.take() {
            handle.abort();
        }
        let server = self.inner.server.clone();
        self.inner
            .pending
            .fail_all(move || TransportError::unavailable(&server, "transport stopped"));
    }
}

impl SseInner {
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
        let rx = self.pending.register(id);

        let url = format!("{base_url}/messages");
        let posted = self
            .http
            .post(&url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await;
        match posted {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                self.pending.forget(id);
                return Err(TransportError::unavailable(
                    &self.server,
                    format!("request endpoint returned HTTP {}", response.status()),
                ));
            }
            Err(source) => {
                self.pending.forget(id);
                return Err(TransportError::unavailable(
                    &self.server,
                    format!("request failed: {source}"),
                ));
            }
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::unavailable(
                &self.server,
                "event stream closed before a response arrived",
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

    /// Consume the long-lived event stream, feeding `data:` payloads into the
    /// pending map.
    async fn event_loop(self: Arc<Self>, response: reqwest::Response) {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    warn!(server = %self.server, %source, "event stream read failed");
                    break;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                self.handle_event_line(line.trim_end());
            }
        }

        debug!(server = %self.server, "event stream closed");
        let server = self.server.clone();
        self.pending
            .fail_all(move || TransportError::unavailable(&server, "event stream closed"));
    }

    fn handle_event_line(&self, line: &str) {
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        if let Some(response) = parse_response_line(&self.server, payload.trim()) {
            self.pending.complete(&self.server, response);
        }
    }
}
