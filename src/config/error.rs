use std::path::PathBuf;

use thiserror::Error;

/// Failure modes when loading the MCP server registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}", path = path.display())]
    Missing { path: PathBuf },

    #[error("failed to read config file {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}", path = path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
