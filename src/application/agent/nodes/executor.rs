//! Executor node: runs exactly the task at `current_task_index`. Failures are
//! recorded as failed results and leave the index in place so the evaluator
//! routes back to the planner.

use std::fmt::Write as _;

use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::super::errors::AgentError;
use super::super::models::{Task, TaskResult};
use super::super::prompts::EXECUTOR_TASK_SYSTEM_PROMPT;
use super::super::state::AgentState;
use crate::application::tooling::{ToolDispatch, CANCELLED_ERROR};
use crate::domain::ChatMessage;
use crate::infrastructure::model::{InvokeOptions, LlmUsage, ModelError, ModelProvider, Prompt};

pub(crate) async fn run(
    llm: &dyn ModelProvider,
    tools: &dyn ToolDispatch,
    mut state: AgentState,
    cancel: &CancellationToken,
) -> Result<AgentState, AgentError> {
    let Some(task) = state.current_task().cloned() else {
        // Unreachable through the router; kept as a guard.
        state.error = Some("no task to execute".to_string());
        return Ok(state);
    };

    info!(task = %task.id, description = %task.description, "executing task");

    let unsatisfied: Vec<&str> = task
        .depends_on
        .iter()
        .filter(|dep| !state.result_for(dep).is_some_and(|result| result.success))
        .map(|dep| dep.as_str())
        .collect();
    if !unsatisfied.is_empty() {
        let listed = unsatisfied.join(", ");
        warn!(task = %task.id, dependencies = %listed, "dependencies unsatisfied");
        state
            .execution_results
            .push(TaskResult::failed(&task.id, format!(
                "unsatisfied dependencies: {listed}"
            )));
        return Ok(state);
    }

    let resolved_input = match &task.tool_input {
        Some(input) => match resolve_references(input, &state) {
            Ok(resolved) => Some(resolved),
            Err(message) => {
                warn!(task = %task.id, %message, "input resolution failed");
                state
                    .execution_results
                    .push(TaskResult::failed(&task.id, message));
                return Ok(state);
            }
        },
        None => None,
    };

    let result = if let Some(call) = &task.tool_call {
        let input = Value::Object(resolved_input.unwrap_or_default());
        let outcome = tools.execute_tool(call, input, cancel).await;
        if outcome.success {
            TaskResult::ok(&task.id, outcome.result.unwrap_or(Value::Null))
        } else {
            TaskResult::failed(
                &task.id,
                outcome.error.unwrap_or_else(|| "tool call failed".to_string()),
            )
        }
    } else {
        let (result, usage) = run_llm_task(llm, &task, resolved_input, &state, cancel).await?;
        state.record_usage(usage);
        result
    };

    if result.success {
        info!(task = %task.id, "task completed");
        state.execution_results.push(result);
        state.current_task_index += 1;
    } else {
        warn!(
            task = %task.id,
            error = result.error.as_deref().unwrap_or_default(),
            "task failed"
        );
        state.execution_results.push(result);
    }
    Ok(state)
}

/// Model-only task: the description plus dependency results and the resolved
/// input become the prompt.
async fn run_llm_task(
    llm: &dyn ModelProvider,
    task: &Task,
    resolved_input: Option<JsonMap<String, Value>>,
    state: &AgentState,
    cancel: &CancellationToken,
) -> Result<(TaskResult, Option<LlmUsage>), AgentError> {
    let mut prompt = task.description.clone();
    if let Some(context) = dependency_context(task, state) {
        prompt.push_str(&context);
    }
    if let Some(input) = resolved_input.filter(|input| !input.is_empty()) {
        let _ = write!(prompt, "\n\nTask input:\n{}", Value::Object(input));
    }

    let messages = vec![
        ChatMessage::system(EXECUTOR_TASK_SYSTEM_PROMPT),
        ChatMessage::human(prompt),
    ];
    let options = InvokeOptions::with_cancel(cancel.clone());

    match llm.invoke(Prompt::Messages(messages), &options).await {
        Ok(completion) => Ok((
            TaskResult::ok(&task.id, Value::String(completion.content)),
            completion.usage,
        )),
        Err(err @ ModelError::Identity(_)) => Err(AgentError::Model(err)),
        Err(ModelError::Cancelled) => Ok((TaskResult::failed(&task.id, CANCELLED_ERROR), None)),
        Err(err) => Ok((TaskResult::failed(&task.id, err.to_string()), None)),
    }
}

fn dependency_context(task: &Task, state: &AgentState) -> Option<String> {
    if task.depends_on.is_empty() {
        return None;
    }
    let mut context = String::from("\n\nContext from previous tasks:");
    for dep in &task.depends_on {
        let Some(result) = state.result_for(dep) else {
            continue;
        };
        let _ = write!(context, "\n--- Result from task '{dep}' ---\n");
        match &result.result {
            Some(Value::String(text)) => context.push_str(text),
            Some(value) => context.push_str(&value.to_string()),
            None => context.push_str("(no output)"),
        }
    }
    Some(context)
}

/// Replace `"${task_id.result}"` placeholder strings with the referenced
/// task's result, recursively through nested values. A placeholder must be
/// the entire string; any other `${` occurrence is rejected.
fn resolve_references(
    input: &JsonMap<String, Value>,
    state: &AgentState,
) -> Result<JsonMap<String, Value>, String> {
    let mut resolved = JsonMap::new();
    for (key, value) in input {
        resolved.insert(key.clone(), resolve_value(value, state)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, state: &AgentState) -> Result<Value, String> {
    match value {
        Value::String(text) => {
            if let Some(task_id) = placeholder_target(text) {
                match state.result_for(task_id) {
                    Some(result) if result.success => {
                        Ok(result.result.clone().unwrap_or(Value::Null))
                    }
                    _ => Err(format!("unresolved reference: {text}")),
                }
            } else if text.contains("${") {
                Err(format!("unresolved reference: {text}"))
            } else {
                Ok(value.clone())
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, state))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve_references(map, state).map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// `${task_id.result}` when the placeholder spans the whole string.
fn placeholder_target(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("${")?.strip_suffix('}')?;
    let task_id = inner.strip_suffix(".result")?;
    if task_id.is_empty() || task_id.contains('$') || task_id.contains('{') {
        return None;
    }
    Some(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with_result(result: TaskResult) -> AgentState {
        let mut state = AgentState::new("s");
        state.execution_results.push(result);
        state
    }

    #[test]
    fn placeholder_grammar_is_strict() {
        assert_eq!(placeholder_target("${t1.result}"), Some("t1"));
        assert_eq!(placeholder_target("${t1.result} extra"), None);
        assert_eq!(placeholder_target("prefix ${t1.result}"), None);
        assert_eq!(placeholder_target("${t1}"), None);
        assert_eq!(placeholder_target("${${t1.result}.result}"), None);
        assert_eq!(placeholder_target("plain"), None);
    }

    #[test]
    fn resolves_whole_string_placeholder() {
        let state = state_with_result(TaskResult::ok("t1", json!("abc")));
        let mut input = JsonMap::new();
        input.insert("text".into(), json!("${t1.result}"));

        let resolved = resolve_references(&input, &state).unwrap();
        assert_eq!(resolved["text"], json!("abc"));
    }

    #[test]
    fn resolves_nested_values() {
        let state = state_with_result(TaskResult::ok("t1", json!({"k": 1})));
        let mut input = JsonMap::new();
        input.insert("wrapped".into(), json!({"inner": ["${t1.result}", "literal"]}));

        let resolved = resolve_references(&input, &state).unwrap();
        assert_eq!(resolved["wrapped"], json!({"inner": [{"k": 1}, "literal"]}));
    }

    #[test]
    fn missing_reference_is_an_error() {
        let state = AgentState::new("s");
        let mut input = JsonMap::new();
        input.insert("text".into(), json!("${ghost.result}"));

        let err = resolve_references(&input, &state).unwrap_err();
        assert!(err.contains("unresolved reference"));
    }

    #[test]
    fn failed_dependency_result_does_not_resolve() {
        let state = state_with_result(TaskResult::failed("t1", "boom"));
        let mut input = JsonMap::new();
        input.insert("text".into(), json!("${t1.result}"));

        assert!(resolve_references(&input, &state).is_err());
    }

    #[test]
    fn embedded_placeholder_is_rejected() {
        let state = state_with_result(TaskResult::ok("t1", json!("abc")));
        let mut input = JsonMap::new();
        input.insert("text".into(), json!("value: ${t1.result}"));

        let err = resolve_references(&input, &state).unwrap_err();
        assert!(err.contains("unresolved reference"));
    }
}
