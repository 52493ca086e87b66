use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::engine::types::{Context, StepDefinition, StepOutput, StepResult};
use crate::steps::interpolate::interpolate;
use crate::steps::notify::Notifier;
use crate::steps::{StepHandler, config_str_list};

pub struct NotificationHandler {
    notifier: Arc<dyn Notifier>,
}

impl NotificationHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl StepHandler for NotificationHandler {
    fn description(&self) -> &str {
        "Send a message to a list of recipients"
    }

    async fn execute(&self, step: &StepDefinition, ctx: &Context) -> Result<StepResult> {
        let recipients: Vec<String> = config_str_list(step, "recipients")?
            .into_iter()
            .map(String::from)
            .collect();

        let message = step
            .config
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let rendered = interpolate(message, ctx);

        if let Err(e) = self.notifier.notify(&recipients, &rendered).await {
            warn!(step = %step.id, error = %format!("{:#}", e), "Notification delivery failed");
        }

        let mut output = StepOutput::new();
        output.insert(
            "notified".to_string(),
            serde_json::json!(recipients.len()),
        );
        Ok(StepResult::success(output))
    }
}
