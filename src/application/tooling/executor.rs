//! Routes `server:tool` calls to the right transport, caching each server's
//! tool catalog after the first discovery.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TransportError;
use super::transport::{create_transport, ToolDescriptor, Transport};
use crate::config::{McpConfig, ServerConfig};

/// Message recorded when a dispatch is interrupted by cancellation.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Structured result of a tool dispatch. Exactly one of `result` / `error`
/// is populated; no error ever escapes `execute_tool` as a panic or `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub tool_call: String,
}

impl ToolOutcome {
    pub fn ok(tool_call: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            tool_call: tool_call.into(),
        }
    }

    pub fn failed(tool_call: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            tool_call: tool_call.into(),
        }
    }
}

/// Result of checking a `server:tool` string against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallValidation {
    Valid,
    MalformedCall { message: String },
    UnknownServer { server: String },
    ServerDisabled { server: String },
    UnknownTool { server: String, tool: String },
    ServerUnreachable { server: String, message: String },
}

/// The seam the agent nodes depend on. Implemented by [`McpExecutor`] and by
/// test stubs.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn execute_tool(
        &self,
        call: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome;

    /// Tool catalog per enabled server, discovering lazily. A server that
    /// cannot be reached contributes an empty list.
    async fn available_tools(&self) -> BTreeMap<String, Vec<ToolDescriptor>>;

    async fn shutdown(&self) {}
}

pub struct McpExecutor {
    config: McpConfig,
    transports: AsyncMutex<HashMap<String, Arc<dyn Transport>>>,
    catalogs: AsyncMutex<HashMap<String, Vec<ToolDescriptor>>>,
}

impl McpExecutor {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            transports: AsyncMutex::new(HashMap::new()),
            catalogs: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Split a `server:tool` call string into its two segments.
    pub fn parse_call(call: &str) -> Result<(&str, &str), String> {
        let parts: Vec<&str> = call.split(':').collect();
        match parts.as_slice() {
            [server, tool] if !server.is_empty() && !tool.is_empty() => Ok((server, tool)),
            _ => Err(format!(
                "invalid tool call '{call}': expected 'server:tool'"
            )),
        }
    }

    pub async fn validate_tool_call(&self, call: &str) -> ToolCallValidation {
        let (server, tool) = match Self::parse_call(call) {
            Ok(parts) => parts,
            Err(message) => return ToolCallValidation::MalformedCall { message },
        };
        let Some(config) = self.config.get_server_metadata(server) else {
            return ToolCallValidation::UnknownServer {
                server: server.to_string(),
            };
        };
        if !config.enabled {
            return ToolCallValidation::ServerDisabled {
                server: server.to_string(),
            };
        }
        let config = config.clone();
        match self.resolve_catalog(server, &config).await {
            Ok(catalog) if catalog.iter().any(|t| t.name == tool) => ToolCallValidation::Valid,
            Ok(_) => ToolCallValidation::UnknownTool {
                server: server.to_string(),
                tool: tool.to_string(),
            },
            Err(err) => ToolCallValidation::ServerUnreachable {
                server: server.to_string(),
                message: err.to_string(),
            },
        }
    }

    async fn transport_for(&self, server: &str, config: &ServerConfig) -> Arc<dyn Transport> {
        let mut transports = self.transports.lock().await;
        transports
            .entry(server.to_string())
            .or_insert_with(|| create_transport(server, config.transport))
            .clone()
    }

    /// Cached catalog for a server, populating it on first use. A configured
    /// `tools` list short-circuits discovery; otherwise the transport is
    /// started and asked via `list_tools`.
    async fn resolve_catalog(
        &self,
        server: &str,
        config: &ServerConfig,
    ) -> Result<Vec<ToolDescriptor>, TransportError> {
        if let Some(catalog) = self.catalogs.lock().await.get(server) {
            return Ok(catalog.clone());
        }

        let catalog = match &config.tools {
            Some(names) => names
                .iter()
                .map(|name| ToolDescriptor {
                    name: name.clone(),
                    description: None,
                    input_schema: None,
                })
                .collect(),
            None => {
                let transport = self.transport_for(server, config).await;
                transport.start(&config.command, &config.args).await?;
                transport.list_tools().await?
            }
        };

        debug!(server, tools = catalog.len(), "cached tool catalog");
        self.catalogs
            .lock()
            .await
            .insert(server.to_string(), catalog.clone());
        Ok(catalog)
    }
}

#[async_trait]
impl ToolDispatch for McpExecutor {
    async fn execute_tool(
        &self,
        call: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let (server, tool) = match Self::parse_call(call) {
            Ok(parts) => parts,
            Err(message) => return ToolOutcome::failed(call, message),
        };

        let Some(config) = self.config.get_server_metadata(server) else {
            return ToolOutcome::failed(call, format!("MCP server '{server}' is not configured"));
        };
        if !config.enabled {
            return ToolOutcome::failed(call, format!("MCP server '{server}' is not enabled"));
        }
        let config = config.clone();

        let catalog = match self.resolve_catalog(server, &config).await {
            Ok(catalog) => catalog,
            Err(err) => return ToolOutcome::failed(call, err.to_string()),
        };
        if !catalog.iter().any(|t| t.name == tool) {
            return ToolOutcome::failed(
                call,
                format!("tool '{tool}' not found on server '{server}'"),
            );
        }

        let transport = self.transport_for(server, &config).await;
        if let Err(err) = transport.start(&config.command, &config.args).await {
            return ToolOutcome::failed(call, err.to_string());
        }

        info!(server, tool, "dispatching tool call");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ToolOutcome::failed(call, CANCELLED_ERROR),
            result = transport.execute_tool(tool, input) => match result {
                Ok(value) => ToolOutcome::ok(call, value),
                Err(err) => ToolOutcome::failed(call, err.to_string()),
            },
        }
    }

    async fn available_tools(&self) -> BTreeMap<String, Vec<ToolDescriptor>> {
        let mut listing = BTreeMap::new();
        for server in self.config.get_enabled_servers() {
            let Some(config) = self.config.get_server_metadata(&server) else {
                continue;
            };
            let config = config.clone();
            match self.resolve_catalog(&server, &config).await {
                Ok(catalog) => {
                    listing.insert(server, catalog);
                }
                Err(err) => {
                    warn!(server = %server, %err, "failed to discover tools");
                    listing.insert(server, Vec::new());
                }
            }
        }
        listing
    }

    async fn shutdown(&self) {
        let transports: Vec<(String, Arc<dyn Transport>)> =
            self.transports.lock().await.drain().collect();
        for (server, transport) in transports {
            debug!(server = %server, "stopping transport");
            transport.stop().await;
        }
        self.catalogs.lock().await.clear();
    }
}

static GLOBAL_EXECUTOR: OnceLock<Arc<McpExecutor>> = OnceLock::new();

/// Install the process-wide executor. Returns false if one is already set.
/// Nodes never consult this; it exists for embedders that cannot thread the
/// executor through their call graph.
pub fn install_global(executor: Arc<McpExecutor>) -> bool {
    GLOBAL_EXECUTOR.set(executor).is_ok()
}

pub fn global() -> Option<Arc<McpExecutor>> {
    GLOBAL_EXECUTOR.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use std::collections::BTreeMap as ConfigMap;

    fn executor_with(servers: ConfigMap<String, ServerConfig>) -> McpExecutor {
        McpExecutor::new(McpConfig::from_servers(servers))
    }

    fn server(command: &str, enabled: bool, tools: Option<Vec<&str>>) -> ServerConfig {
        ServerConfig {
            command: command.to_string(),
            args: Vec::new(),
            transport: TransportKind::Stdio,
            enabled,
            tools: tools.map(|names| names.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn parses_well_formed_calls() {
        assert_eq!(McpExecutor::parse_call("clock:now").unwrap(), ("clock", "now"));
    }

    #[test]
    fn rejects_malformed_calls() {
        assert!(McpExecutor::parse_call("clock").is_err());
        assert!(McpExecutor::parse_call("clock:").is_err());
        assert!(McpExecutor::parse_call(":now").is_err());
        assert!(McpExecutor::parse_call("a:b:c").is_err());
    }

    #[tokio::test]
    async fn unknown_server_fails_without_spawning() {
        let executor = executor_with(ConfigMap::new());
        let outcome = executor
            .execute_tool("ghost:now", serde_json::json!({}), &CancellationToken::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn disabled_server_is_rejected() {
        let mut servers = ConfigMap::new();
        servers.insert("clock".into(), server("clock-server", false, None));
        let executor = executor_with(servers);

        let outcome = executor
            .execute_tool("clock:now", serde_json::json!({}), &CancellationToken::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not enabled"));
    }

    #[tokio::test]
    async fn configured_catalog_rejects_unknown_tool() {
        let mut servers = ConfigMap::new();
        servers.insert("clock".into(), server("/nonexistent", true, Some(vec!["now"])));
        let executor = executor_with(servers);

        let outcome = executor
            .execute_tool("clock:tomorrow", serde_json::json!({}), &CancellationToken::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn dead_command_surfaces_as_failed_outcome() {
        let mut servers = ConfigMap::new();
        servers.insert(
            "clock".into(),
            server("/nonexistent-mcp-server", true, Some(vec!["now"])),
        );
        let executor = executor_with(servers);

        let outcome = executor
            .execute_tool("clock:now", serde_json::json!({}), &CancellationToken::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn cancelled_dispatch_reports_cancellation() {
        let mut servers = ConfigMap::new();
        servers.insert("slow".into(), server("sleep", true, Some(vec!["wait"])));
        let executor = executor_with(servers);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = executor
            .execute_tool("slow:wait", serde_json::json!({}), &cancel)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(CANCELLED_ERROR));
    }

    #[tokio::test]
    async fn validation_distinguishes_failure_modes() {
        let mut servers = ConfigMap::new();
        servers.insert("clock".into(), server("clock-server", true, Some(vec!["now"])));
        servers.insert("dark".into(), server("dark-server", false, None));
        let executor = executor_with(servers);

        assert_eq!(
            executor.validate_tool_call("clock:now").await,
            ToolCallValidation::Valid
        );
        assert!(matches!(
            executor.validate_tool_call("clock:tomorrow").await,
            ToolCallValidation::UnknownTool { .. }
        ));
        assert!(matches!(
            executor.validate_tool_call("dark:anything").await,
            ToolCallValidation::ServerDisabled { .. }
        ));
        assert!(matches!(
            executor.validate_tool_call("ghost:x").await,
            ToolCallValidation::UnknownServer { .. }
        ));
        assert!(matches!(
            executor.validate_tool_call("broken").await,
            ToolCallValidation::MalformedCall { .. }
        ));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let executor = executor_with(ConfigMap::new());
        executor.shutdown().await;
        executor.shutdown().await;
    }
}
