//! Identity prompt loader.
//!
//! `SOUL.md` carries the agent's values, `AGENT.md` its capabilities. Both are
//! read fresh on every call so edits between sessions (or between LLM calls)
//! take effect immediately.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub const SOUL_FILE: &str = "SOUL.md";
pub const AGENT_FILE: &str = "AGENT.md";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file not found at {path:?}")]
    Missing { path: PathBuf },

    #[error("failed to read identity file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Loads and concatenates the identity files into one system prompt.
#[derive(Debug, Clone)]
pub struct IdentityLoader {
    soul_path: PathBuf,
    agent_path: PathBuf,
}

impl IdentityLoader {
    /// Conventional layout: `<workspace>/SOUL.md` and `<workspace>/AGENT.md`.
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        let workspace = workspace.as_ref();
        Self {
            soul_path: workspace.join(SOUL_FILE),
            agent_path: workspace.join(AGENT_FILE),
        }
    }

    pub fn from_paths(soul_path: impl Into<PathBuf>, agent_path: impl Into<PathBuf>) -> Self {
        Self {
            soul_path: soul_path.into(),
            agent_path: agent_path.into(),
        }
    }

    /// Read both files and join them with a blank line. No caching.
    pub async fn load(&self) -> Result<String, IdentityError> {
        let soul = read_identity_file(&self.soul_path).await?;
        let agent = read_identity_file(&self.agent_path).await?;
        debug!(
            soul = %self.soul_path.display(),
            agent = %self.agent_path.display(),
            "loaded identity prompt"
        );
        Ok(format!("{}\n\n{}", soul.trim_end(), agent.trim_end()))
    }
}

async fn read_identity_file(path: &Path) -> Result<String, IdentityError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Err(IdentityError::Missing {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(IdentityError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
