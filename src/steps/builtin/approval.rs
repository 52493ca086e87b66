use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::steps::StepHandler;

/// Records an approval decision for `required_role`. Authorization itself is
/// enforced outside the engine.
pub struct ApprovalHandler;

#[async_trait]
impl StepHandler for ApprovalHandler {
    fn description(&self) -> &str {
        "Record an approval for a required role"
    }

    async fn execute(&self, step: &StepDefinition, _ctx: &Context) -> Result<StepResult> {
        let role = step
            .config
            .get("required_role")
            .and_then(|v| v.as_str())
            .unwrap_or("admin");

        let mut output = StepOutput::new();
        output.insert("approved".to_string(), serde_json::Value::Bool(true));
        output.insert(
            "role".to_string(),
            serde_json::Value::String(role.to_string()),
        );
        Ok(StepResult::success(output))
    }
}
