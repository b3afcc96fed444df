//! Finalizer node: turns the execution trace into a user-facing answer. This
//! node never fails; when its own model call does, a fallback message still
//! reports what happened.

use std::fmt::Write as _;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::super::models::{AgentResponse, TraceEntry, UsageSummary};
use super::super::prompts::FINALIZER_SYSTEM_PROMPT;
use super::super::state::AgentState;
use crate::domain::{ChatMessage, MessageRole};
use crate::infrastructure::model::{InvokeOptions, LlmUsage, ModelError, ModelProvider, Prompt};

pub(crate) async fn run(
    llm: &dyn ModelProvider,
    mut state: AgentState,
    cancel: &CancellationToken,
) -> AgentState {
    let trace = build_trace(&state);
    let succeeded = trace.iter().filter(|entry| entry.success).count();
    let failed = trace.len() - succeeded;

    let message = if let Some(error) = &state.error {
        // Forced finalization: report deterministically, no model round trip.
        warn!(%error, "finalizing after an unrecoverable error");
        format!(
            "The request could not be completed: {error}. \
             {succeeded} task(s) succeeded and {failed} failed."
        )
    } else {
        match synthesize(llm, &state, cancel).await {
            Ok((message, usage)) => {
                state.record_usage(usage);
                message
            }
            Err(err) => {
                warn!(%err, "final response generation failed, using fallback");
                format!(
                    "The tasks finished, but the summary could not be generated ({err}). \
                     {succeeded} task(s) succeeded and {failed} failed."
                )
            }
        }
    };

    info!(tasks = trace.len(), "finalized response");
    state.final_response = Some(AgentResponse {
        message,
        execution_trace: trace,
        plan_used: state.plan.clone(),
        total_usage: UsageSummary::from_usages(&state.llm_usage),
    });
    state
}

async fn synthesize(
    llm: &dyn ModelProvider,
    state: &AgentState,
    cancel: &CancellationToken,
) -> Result<(String, Option<LlmUsage>), ModelError> {
    let user_request = state
        .messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::Human)
        .map(|message| message.content.clone())
        .unwrap_or_default();

    let mut summary = String::new();
    if let Some(plan) = &state.plan {
        let _ = write!(summary, "Plan: {}\n\n", plan.reasoning);
    }
    summary.push_str("Execution results:\n");
    if state.turn_results().is_empty() {
        summary.push_str("(no tasks were executed)\n");
    }
    for result in state.turn_results() {
        if result.success {
            let output = result
                .result
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            let _ = writeln!(summary, "Task {}: {output}", result.task_id);
        } else {
            let _ = writeln!(
                summary,
                "Task {} failed: {}",
                result.task_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let messages = vec![
        ChatMessage::system(FINALIZER_SYSTEM_PROMPT),
        ChatMessage::human(format!(
            "Original user request: {user_request}\n\n{summary}\nCreate a response for the user."
        )),
    ];
    let options = InvokeOptions::with_cancel(cancel.clone());
    let completion = llm.invoke(Prompt::Messages(messages), &options).await?;
    Ok((completion.content, completion.usage))
}

fn build_trace(state: &AgentState) -> Vec<TraceEntry> {
    state
        .turn_results()
        .iter()
        .map(|result| TraceEntry {
            task_id: result.task_id.clone(),
            description: state
                .plan
                .as_ref()
                .and_then(|plan| plan.task_description(&result.task_id))
                .map(String::from),
            success: result.success,
            output: result.result.clone(),
            error: result.error.clone(),
            timestamp: result.timestamp,
        })
        .collect()
}
