//! The plan/execute/evaluate state machine.
//!
//! Fixed edges run Planner → Executor → Evaluator; the evaluator routes back
//! to the planner or executor, or forward to the finalizer. A transition
//! limit bounds replan oscillation: once exceeded, the finalizer is entered
//! unconditionally.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::errors::AgentError;
use super::models::EvaluationDecision;
use super::nodes::{evaluator, executor, finalizer, planner};
use super::state::AgentState;
use crate::application::tooling::ToolDispatch;
use crate::infrastructure::model::ModelProvider;

/// Maximum node transitions per invocation.
pub const MAX_TRANSITIONS: usize = 50;

/// Error recorded when the transition limit is exceeded.
pub const TRANSITION_LIMIT_ERROR: &str = "transition-limit-exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Planner,
    Executor,
    Evaluator,
    Finalizer,
}

/// Drive the state machine until a final response exists. Returns the
/// terminal state; a fatal error is paired with the last consistent state so
/// the caller can still persist it.
pub(super) async fn run_to_completion(
    llm: &dyn ModelProvider,
    tools: &dyn ToolDispatch,
    mut state: AgentState,
    cancel: &CancellationToken,
) -> Result<AgentState, (AgentError, AgentState)> {
    let mut node = Node::Planner;
    let mut transitions = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err((AgentError::Cancelled, state));
        }

        transitions += 1;
        if transitions > MAX_TRANSITIONS {
            warn!(transitions, "transition limit exceeded, forcing finalization");
            state.error = Some(TRANSITION_LIMIT_ERROR.to_string());
            let state = finalizer::run(llm, state, cancel).await;
            return Ok(state);
        }
        debug!(?node, transitions, "entering node");

        node = match node {
            Node::Planner => {
                let checkpoint = state.clone();
                state = match planner::run(llm, tools, state, cancel).await {
                    Ok(next) => next,
                    Err(fatal) => return Err((fatal, checkpoint)),
                };
                if state.error.is_some() {
                    Node::Evaluator
                } else {
                    Node::Executor
                }
            }
            Node::Executor => {
                let checkpoint = state.clone();
                state = match executor::run(llm, tools, state, cancel).await {
                    Ok(next) => next,
                    Err(fatal) => return Err((fatal, checkpoint)),
                };
                Node::Evaluator
            }
            Node::Evaluator => match evaluator::run(&state) {
                EvaluationDecision::Replan => Node::Planner,
                EvaluationDecision::Continue => Node::Executor,
                EvaluationDecision::Finalize => Node::Finalizer,
            },
            Node::Finalizer => {
                let state = finalizer::run(llm, state, cancel).await;
                return Ok(state);
            }
        };
    }
}
