use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::steps::StepHandler;

pub struct WaitHandler;

#[async_trait]
impl StepHandler for WaitHandler {
    fn description(&self) -> &str {
        "Pause the instance for duration_seconds"
    }

    async fn execute(&self, step: &StepDefinition, _ctx: &Context) -> Result<StepResult> {
        let duration = step
            .config
            .get("duration_seconds")
            .cloned()
            .unwrap_or_else(|| serde_json::json!(1));

        let seconds = duration
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("wait requires 'duration_seconds' to be a number"))?;
        let pause = Duration::try_from_secs_f64(seconds).map_err(|_| {
            anyhow::anyhow!(
                "wait duration must be a non-negative number of seconds, got {}",
                seconds
            )
        })?;

        tokio::time::sleep(pause).await;

        let mut output = StepOutput::new();
        output.insert("waited_seconds".to_string(), duration);
        Ok(StepResult::success(output))
    }
}
