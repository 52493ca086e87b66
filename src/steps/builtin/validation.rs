use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::steps::{StepHandler, config_str_list};

/// Checks that each `required_fields` entry is a top-level context key.
/// Dotted names are taken literally, not as paths.
pub struct ValidationHandler;

#[async_trait]
impl StepHandler for ValidationHandler {
    fn description(&self) -> &str {
        "Check that required fields are present in the context"
    }

    async fn execute(&self, step: &StepDefinition, ctx: &Context) -> Result<StepResult> {
        let required = config_str_list(step, "required_fields")?;

        let missing: Vec<&str> = required
            .into_iter()
            .filter(|field| !ctx.contains_key(*field))
            .collect();

        let mut output = StepOutput::new();
        output.insert(
            "valid".to_string(),
            serde_json::Value::Bool(missing.is_empty()),
        );
        output.insert("missing_fields".to_string(), serde_json::json!(missing));

        if missing.is_empty() {
            Ok(StepResult::success(output))
        } else {
            let error = format!("Missing: {}", missing.join(", "));
            Ok(StepResult::failed(output, error))
        }
    }
}
