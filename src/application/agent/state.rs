//! The session snapshot threaded through every node transition.

use serde::{Deserialize, Serialize};

use super::models::{AgentResponse, Plan, Task, TaskResult};
use crate::domain::ChatMessage;
use crate::infrastructure::model::LlmUsage;

/// Full session state. Nodes take it by value and return the updated copy;
/// the agent persists it at the end of every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub plan: Option<Plan>,
    pub current_task_index: usize,
    /// Append-only for the life of the session.
    pub execution_results: Vec<TaskResult>,
    /// Index into `execution_results` where the current turn began.
    pub turn_results_start: usize,
    pub final_response: Option<AgentResponse>,
    pub error: Option<String>,
    pub llm_usage: Vec<LlmUsage>,
}

impl AgentState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            plan: None,
            current_task_index: 0,
            execution_results: Vec::new(),
            turn_results_start: 0,
            final_response: None,
            error: None,
            llm_usage: Vec::new(),
        }
    }

    /// Prepare the state for a new user turn: append the message and reset
    /// everything that belongs to a single invocation. Prior messages and
    /// task results are kept.
    pub fn begin_turn(&mut self, user_message: impl Into<String>) {
        self.messages.push(ChatMessage::human(user_message));
        self.plan = None;
        self.current_task_index = 0;
        self.turn_results_start = self.execution_results.len();
        self.final_response = None;
        self.error = None;
        self.llm_usage.clear();
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.tasks.get(self.current_task_index))
    }

    pub fn last_result(&self) -> Option<&TaskResult> {
        self.execution_results.last()
    }

    /// Results appended during the current turn.
    pub fn turn_results(&self) -> &[TaskResult] {
        &self.execution_results[self.turn_results_start.min(self.execution_results.len())..]
    }

    pub fn result_for(&self, task_id: &str) -> Option<&TaskResult> {
        // Later results win when a replanned task reuses an id.
        self.execution_results
            .iter()
            .rev()
            .find(|result| result.task_id == task_id)
    }

    pub fn record_usage(&mut self, usage: Option<LlmUsage>) {
        if let Some(usage) = usage {
            self.llm_usage.push(usage);
        }
    }

    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
