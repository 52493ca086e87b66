use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::steps::StepHandler;

/// Placeholder decision point. Branching lives in the step's transition;
/// override this handler to compute decision outputs.
pub struct DecisionHandler;

#[async_trait]
impl StepHandler for DecisionHandler {
    fn description(&self) -> &str {
        "Decision point (no-op unless overridden)"
    }

    async fn execute(&self, _step: &StepDefinition, _ctx: &Context) -> Result<StepResult> {
        Ok(StepResult::success(StepOutput::new()))
    }
}
