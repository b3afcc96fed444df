//! Evaluator node: routing only. The decision is a pure function of the
//! state; the `EvaluationResult` is logged for introspection and never
//! persisted.

use tracing::info;

use super::super::models::{EvaluationDecision, EvaluationResult};
use super::super::state::AgentState;

pub(crate) fn run(state: &AgentState) -> EvaluationDecision {
    let evaluation = evaluate(state);
    info!(
        decision = %evaluation.decision,
        reasoning = %evaluation.reasoning,
        "evaluated progress"
    );
    evaluation.decision
}

pub(crate) fn evaluate(state: &AgentState) -> EvaluationResult {
    if let Some(error) = &state.error {
        return EvaluationResult {
            decision: EvaluationDecision::Replan,
            reasoning: format!("an error is pending: {error}"),
        };
    }

    let Some(plan) = &state.plan else {
        return EvaluationResult {
            decision: EvaluationDecision::Replan,
            reasoning: "no plan exists yet".to_string(),
        };
    };

    if let Some(last) = state.turn_results().last() {
        if !last.success {
            return EvaluationResult {
                decision: EvaluationDecision::Replan,
                reasoning: format!("task '{}' failed and needs a revised plan", last.task_id),
            };
        }
    }

    if state.current_task_index < plan.tasks.len() {
        EvaluationResult {
            decision: EvaluationDecision::Continue,
            reasoning: format!(
                "task {} of {} is next",
                state.current_task_index + 1,
                plan.tasks.len()
            ),
        }
    } else {
        EvaluationResult {
            decision: EvaluationDecision::Finalize,
            reasoning: "all planned tasks have completed".to_string(),
        }
    }
}
