//! Static MCP server registry, loaded from `mcp_servers.json`.
//!
//! The file shape is `{"mcpServers": {<name>: {command, args?, transport?,
//! enabled?, tools?}}}`. Unknown fields are ignored; the file is read once per
//! `McpConfig` construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Which wire a configured server speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    #[default]
    Stdio,
    HttpStream,
    Sse,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::HttpStream => "http-stream",
            TransportKind::Sse => "sse",
        }
    }
}

/// One entry of the registry. For stdio servers `command`/`args` describe the
/// subprocess; for the HTTP variants `args[0]` carries the base URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Fixed tool catalog. Absent means: discover via `list_tools`.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "mcpServers")]
    mcp_servers: BTreeMap<String, ServerConfig>,
}

/// Parsed registry with lookup helpers.
#[derive(Debug, Clone)]
pub struct McpConfig {
    path: PathBuf,
    servers: BTreeMap<String, ServerConfig>,
}

impl McpConfig {
    /// Read and parse the registry file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing { path });
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let registry: RegistryFile = serde_json::from_str(&raw)
            .map_err(|source| ConfigError::Malformed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            servers: registry.mcp_servers,
        })
    }

    /// Build a registry directly from entries. Used by embedders and tests
    /// that assemble the configuration programmatically.
    pub fn from_servers(servers: BTreeMap<String, ServerConfig>) -> Self {
        Self {
            path: PathBuf::new(),
            servers,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of every configured server, enabled or not.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    /// Names of the servers with `enabled = true`.
    pub fn get_enabled_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_server_enabled(&self, name: &str) -> bool {
        self.servers.get(name).is_some_and(|cfg| cfg.enabled)
    }

    pub fn get_server_metadata(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.get(name)
    }
}
