use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransportError;
use super::http_stream::HttpStreamTransport;
use super::sse::SseTransport;
use super::stdio::StdioTransport;
use crate::config::TransportKind;

/// Upper bound for a single request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

/// One connection to an MCP server.
///
/// `start` and `stop` are idempotent; `execute_tool` blocks until the single
/// correlated response arrives or the request times out.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(&self, command: &str, args: &[String]) -> Result<(), TransportError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError>;

    async fn execute_tool(&self, tool_name: &str, input: Value) -> Result<Value, TransportError>;

    async fn is_alive(&self) -> bool;

    async fn stop(&self);
}

/// Instantiate the transport variant a server is configured with.
pub fn create_transport(server: &str, kind: TransportKind) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Stdio => Arc::new(StdioTransport::new(server)),
        TransportKind::HttpStream => Arc::new(HttpStreamTransport::new(server)),
        TransportKind::Sse => Arc::new(SseTransport::new(server)),
    }
}

/// Decode a `list_tools` result payload (`{"tools": [...]}`).
pub(super) fn parse_tool_listing(
    server: &str,
    result: Value,
) -> Result<Vec<ToolDescriptor>, TransportError> {
    #[derive(Deserialize)]
    struct Listing {
        tools: Vec<ToolDescriptor>,
    }

    serde_json::from_value::<Listing>(result)
        .map(|listing| listing.tools)
        .map_err(|source| {
            TransportError::protocol(server, format!("unparseable tool listing: {source}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_listing() {
        let result = json!({
            "tools": [
                {"name": "now", "description": "current time", "input_schema": {"type": "object"}},
                {"name": "zones"}
            ]
        });
        let tools = parse_tool_listing("clock", result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "now");
        assert_eq!(tools[1].description, None);
    }

    #[test]
    fn rejects_malformed_listing() {
        let err = parse_tool_listing("clock", json!({"tools": "nope"})).unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }
}
