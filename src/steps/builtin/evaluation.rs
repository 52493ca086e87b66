use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::expr::compare_numbers;
use crate::steps::StepHandler;

/// Scores the context against a list of `{name, field, value}` criteria.
/// Informational only: always succeeds, whatever the score.
pub struct EvaluationHandler;

#[async_trait]
impl StepHandler for EvaluationHandler {
    fn description(&self) -> &str {
        "Score the context against equality criteria"
    }

    async fn execute(&self, step: &StepDefinition, ctx: &Context) -> Result<StepResult> {
        let criteria: &[Value] = match step.config.get("criteria") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(_) => anyhow::bail!("evaluation requires 'criteria' to be a list"),
        };

        let mut met_count = 0;
        let mut details = Vec::with_capacity(criteria.len());

        for criterion in criteria {
            let field = criterion.get("field").and_then(Value::as_str);
            let expected = criterion.get("value").unwrap_or(&Value::Null);
            let actual = field.and_then(|f| ctx.get(f)).unwrap_or(&Value::Null);

            let met = same_value(actual, expected);
            if met {
                met_count += 1;
            }
            details.push(serde_json::json!({
                "criterion": criterion.get("name").cloned().unwrap_or(Value::Null),
                "met": met,
            }));
        }

        let mut output = StepOutput::new();
        output.insert("criteria_met".to_string(), serde_json::json!(met_count));
        output.insert(
            "total_criteria".to_string(),
            serde_json::json!(criteria.len()),
        );
        output.insert("details".to_string(), Value::Array(details));
        Ok(StepResult::success(output))
    }
}

/// Equality without type coercion, except that `25` and `25.0` are the same number.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            compare_numbers(x, y) == Some(std::cmp::Ordering::Equal)
        }
        _ => a == b,
    }
}
