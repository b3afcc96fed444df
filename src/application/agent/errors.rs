use thiserror::Error;

use crate::infrastructure::checkpoint::CheckpointError;
use crate::infrastructure::model::ModelError;

/// Failures that escape `Agent::invoke`. Everything recoverable is folded
/// into the session state instead and handled by replanning.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("session snapshot could not be decoded: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("run was cancelled")]
    Cancelled,

    #[error("agent finished without producing a response")]
    MissingResponse,
}
