//! Plan, task, and response types exchanged with the model and persisted in
//! session snapshots.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::infrastructure::model::LlmUsage;

/// One atomic step of a plan. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// `server:tool`, or absent for a model-only task.
    #[serde(default)]
    pub tool_call: Option<String>,
    #[serde(default)]
    pub tool_input: Option<JsonMap<String, Value>>,
    /// Ids of tasks that must have succeeded first.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn is_tool_task(&self) -> bool {
        self.tool_call.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<Task>,
    pub reasoning: String,
}

impl Plan {
    /// Check the structural invariants: at least one task, unique ids, and
    /// dependencies referring only to earlier tasks.
    pub fn validate(&self) -> Result<(), String> {
        if self.tasks.is_empty() {
            return Err("plan contains no tasks".to_string());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(format!("duplicate task id '{}'", task.id));
            }
            for dep in &task.depends_on {
                if !seen.contains(dep.as_str()) || dep == &task.id {
                    return Err(format!(
                        "task '{}' depends on '{}', which is not an earlier task",
                        task.id, dep
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn task_description(&self, task_id: &str) -> Option<&str> {
        self.tasks
            .iter()
            .find(|task| task.id == task_id)
            .map(|task| task.description.as_str())
    }
}

/// Outcome of one task execution. Exactly one of `result` / `error` is set;
/// use the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn ok(task_id: impl Into<String>, result: Value) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Where the evaluator sends control next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationDecision {
    Continue,
    Replan,
    Finalize,
}

impl std::fmt::Display for EvaluationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EvaluationDecision::Continue => "continue",
            EvaluationDecision::Replan => "replan",
            EvaluationDecision::Finalize => "finalize",
        };
        f.write_str(label)
    }
}

/// Logged after every evaluation for introspection; routing itself is
/// computed from state, never from this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: EvaluationDecision,
    pub reasoning: String,
}

/// One line of the execution trace handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub task_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate token accounting for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    pub calls: u64,
}

impl UsageSummary {
    pub fn from_usages<'a>(usages: impl IntoIterator<Item = &'a LlmUsage>) -> Self {
        let mut summary = Self::default();
        for usage in usages {
            summary.total_prompt_tokens += usage.prompt_tokens;
            summary.total_completion_tokens += usage.completion_tokens;
            summary.total_tokens += usage.total_tokens;
            summary.calls += 1;
        }
        summary
    }
}

/// What the caller of `Agent::invoke` receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub message: String,
    pub execution_trace: Vec<TraceEntry>,
    #[serde(default)]
    pub plan_used: Option<Plan>,
    #[serde(default)]
    pub total_usage: UsageSummary,
}
