//! Planner node: asks the model for a structured plan, folding failures into
//! `state.error` so the evaluator can route back here.

use std::fmt::Write as _;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::super::errors::AgentError;
use super::super::models::Plan;
use super::super::prompts::PLANNER_SYSTEM_PROMPT;
use super::super::state::AgentState;
use crate::application::tooling::ToolDispatch;
use crate::domain::ChatMessage;
use crate::infrastructure::model::{
    invoke_structured, InvokeOptions, ModelError, ModelProvider, Prompt,
};

pub(crate) async fn run(
    llm: &dyn ModelProvider,
    tools: &dyn ToolDispatch,
    mut state: AgentState,
    cancel: &CancellationToken,
) -> Result<AgentState, AgentError> {
    let tool_listing = render_tool_listing(tools).await;

    let mut messages = vec![ChatMessage::system(format!(
        "{PLANNER_SYSTEM_PROMPT}\n\n{tool_listing}"
    ))];
    messages.extend(state.messages.iter().cloned());
    if let Some(context) = failure_context(&state) {
        messages.push(ChatMessage::human(context));
    }

    let options = InvokeOptions::with_cancel(cancel.clone());
    match invoke_structured::<Plan>(llm, Prompt::Messages(messages), &options).await {
        Ok(completion) => {
            state.record_usage(completion.usage);
            match completion.value.validate() {
                Ok(()) => {
                    info!(
                        tasks = completion.value.tasks.len(),
                        "planner produced a plan"
                    );
                    state.plan = Some(completion.value);
                    state.current_task_index = 0;
                    state.error = None;
                }
                Err(flaw) => {
                    warn!(%flaw, "planner produced an invalid plan");
                    state.error = Some(format!("planner produced an invalid plan: {flaw}"));
                }
            }
            Ok(state)
        }
        Err(err @ ModelError::Identity(_)) => Err(AgentError::Model(err)),
        Err(ModelError::Cancelled) => Err(AgentError::Cancelled),
        Err(err) => {
            warn!(%err, "planning failed");
            state.error = Some(format!("planning failed: {err}"));
            Ok(state)
        }
    }
}

/// Render every available tool as one line the model can pick from.
async fn render_tool_listing(tools: &dyn ToolDispatch) -> String {
    let catalog = tools.available_tools().await;
    if catalog.values().all(Vec::is_empty) {
        return "No tools are available; use reasoning tasks only.".to_string();
    }

    let mut listing = String::from("Available tools:\n");
    for (server, descriptors) in &catalog {
        for tool in descriptors {
            let _ = write!(listing, "- {server}:{}", tool.name);
            if let Some(description) = &tool.description {
                let _ = write!(listing, ": {description}");
            }
            if let Some(schema) = &tool.input_schema {
                let _ = write!(listing, " (input schema: {schema})");
            }
            listing.push('\n');
        }
    }
    listing
}

/// After a failed attempt, tell the planner what went wrong so the revised
/// plan can react to it.
fn failure_context(state: &AgentState) -> Option<String> {
    let mut context = String::new();
    if let Some(error) = &state.error {
        let _ = write!(context, "The previous attempt failed: {error}.");
    }
    if let Some(last) = state.turn_results().last().filter(|result| !result.success) {
        if !context.is_empty() {
            context.push(' ');
        }
        let _ = write!(
            context,
            "The last executed task '{}' failed with: {}.",
            last.task_id,
            last.error.as_deref().unwrap_or("unknown error")
        );
    }
    if context.is_empty() {
        return None;
    }
    context.push_str(" Revise the plan to work around this.");
    Some(context)
}
