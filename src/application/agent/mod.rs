//! The agent facade: wires the model provider, tool dispatcher, and
//! checkpoint store into the state machine and exposes session-scoped
//! invocation.

mod errors;
mod graph;
mod models;
mod nodes;
mod prompts;
mod state;


use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use errors::AgentError;
pub use graph::{MAX_TRANSITIONS, TRANSITION_LIMIT_ERROR};
pub use models::{
    AgentResponse, EvaluationDecision, EvaluationResult, Plan, Task, TaskResult, TraceEntry,
    UsageSummary,
};
pub use state::AgentState;

use crate::application::tooling::ToolDispatch;
use crate::domain::ChatMessage;
use crate::infrastructure::checkpoint::CheckpointStore;
use crate::infrastructure::model::ModelProvider;

/// Session-oriented orchestration over a model provider, a tool dispatcher,
/// and a checkpoint store. Cloneable; invocations for different sessions may
/// run concurrently.
#[derive(Clone)]
pub struct Agent {
    llm: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolDispatch>,
    store: Arc<dyn CheckpointStore>,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolDispatch>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self { llm, tools, store }
    }

    /// Process one user message within a session and return the final
    /// response. The session snapshot is loaded (or created), advanced, and
    /// persisted even when the run fails.
    pub async fn invoke(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<AgentResponse, AgentError> {
        self.invoke_with_cancellation(session_id, user_message, CancellationToken::new())
            .await
    }

    pub async fn invoke_with_cancellation(
        &self,
        session_id: &str,
        user_message: &str,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        let mut state = match self.store.get(session_id).await? {
            Some(snapshot) => {
                debug!(session_id, "resuming session from snapshot");
                AgentState::from_snapshot(&snapshot)?
            }
            None => {
                debug!(session_id, "starting fresh session");
                AgentState::new(session_id)
            }
        };
        state.begin_turn(user_message);
        info!(session_id, "agent run started");

        let outcome =
            graph::run_to_completion(self.llm.as_ref(), self.tools.as_ref(), state, &cancel).await;
        let (mut state, fatal) = match outcome {
            Ok(state) => (state, None),
            Err((fatal, state)) => (state, Some(fatal)),
        };

        if fatal.is_none() {
            if let Some(response) = &state.final_response {
                state
                    .messages
                    .push(ChatMessage::assistant(response.message.clone()));
            }
        }

        self.persist(&state).await?;

        if let Some(fatal) = fatal {
            return Err(fatal);
        }
        let response = state.final_response.ok_or(AgentError::MissingResponse)?;
        info!(session_id, tasks = response.execution_trace.len(), "agent run finished");
        Ok(response)
    }

    /// Drop the persisted snapshot for a session.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), AgentError> {
        self.store.delete(session_id).await?;
        Ok(())
    }

    /// Release transports held by the tool dispatcher.
    pub async fn close(&self) {
        self.tools.shutdown().await;
    }

    async fn persist(&self, state: &AgentState) -> Result<(), AgentError> {
        let snapshot = state.to_snapshot()?;
        self.store.put(&state.session_id, &snapshot).await?;
        Ok(())
    }
}
