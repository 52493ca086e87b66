use tracing::warn;

use crate::engine::types::{Context, StepDefinition, Transition};
use crate::expr;

/// Pick the cursor that follows `step`, which ran at index `cursor`.
/// `ctx` must already contain the step's merged output.
pub fn next_index(step: &StepDefinition, cursor: usize, ctx: &Context) -> usize {
    match &step.next {
        None => cursor + 1,
        Some(Transition::Sequential(index)) => *index,
        Some(Transition::Conditional {
            condition,
            then,
            otherwise,
        }) => {
            if condition_holds(&step.id, condition, ctx) {
                *then
            } else {
                otherwise.unwrap_or(cursor + 1)
            }
        }
    }
}

/// Evaluate a transition condition. A malformed expression or a missing
/// variable counts as `false`.
pub fn condition_holds(step_id: &str, condition: &str, ctx: &Context) -> bool {
    match expr::evaluate(condition, ctx) {
        Ok(result) => result,
        Err(e) => {
            warn!(step = %step_id, condition = %condition, error = %e, "Condition evaluation failed, treating as false");
            false
        }
    }
}
