//! Durable session snapshots, keyed by session id.
//!
//! Stores deal in opaque bytes; encoding the agent state is the caller's
//! concern. Writes are serialized per session id.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store I/O failure at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key/value persistence for session snapshots.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, CheckpointError>;

    async fn put(&self, session_id: &str, snapshot: &[u8]) -> Result<(), CheckpointError>;

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// Process-local store; snapshots die with the process.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    snapshots: AsyncMutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        Ok(self.snapshots.lock().await.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, snapshot: &[u8]) -> Result<(), CheckpointError> {
        self.snapshots
            .lock()
            .await
            .insert(session_id.to_string(), snapshot.to_vec());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.snapshots.lock().await.remove(session_id);
        Ok(())
    }
}

/// One snapshot file per session under a root directory. Writes go through a
/// temporary file and a rename, and are serialized per session id.
pub struct FileCheckpointStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| CheckpointError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn snapshot_path(&self, session_id: &str) -> PathBuf {
        // Session ids are caller-supplied; keep file names tame.
        let sanitized: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitized}.ckpt"))
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("session lock table");
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let path = self.snapshot_path(session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    async fn put(&self, session_id: &str, snapshot: &[u8]) -> Result<(), CheckpointError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let path = self.snapshot_path(session_id);
        let tmp = path.with_extension("ckpt.tmp");
        tokio::fs::write(&tmp, snapshot)
            .await
            .map_err(|source| CheckpointError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(session_id, path = %path.display(), "persisted snapshot");
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let path = self.snapshot_path(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}
