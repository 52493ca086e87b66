//! Notification transport used by the built-in notification step.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Delivers a message to a list of recipients.
///
/// Delivery failures are logged by the notification step and never change
/// its result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipients: &[String], message: &str) -> Result<()>;
}

/// Default transport: writes each notification to the tracing log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipients: &[String], message: &str) -> Result<()> {
        info!(recipients = ?recipients, "Notification: {}", message);
        Ok(())
    }
}
