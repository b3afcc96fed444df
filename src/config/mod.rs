pub mod error;
pub mod mcp;

/// Default registry path, relative to the working directory.
pub const MCP_SERVERS_PATH: &str = "config/mcp_servers.json";

pub use error::ConfigError;
pub use mcp::{McpConfig, ServerConfig, TransportKind};
