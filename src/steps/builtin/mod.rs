mod approval;
mod decision;
mod evaluation;
mod notification;
mod validation;
mod wait;

use std::sync::Arc;

use crate::engine::types::StepType;
use crate::steps::HandlerRegistry;
use crate::steps::notify::Notifier;

pub use approval::ApprovalHandler;
pub use decision::DecisionHandler;
pub use evaluation::EvaluationHandler;
pub use notification::NotificationHandler;
pub use validation::ValidationHandler;
pub use wait::WaitHandler;

/// Register all built-in handlers into the registry.
pub fn register_all(registry: &HandlerRegistry, notifier: Arc<dyn Notifier>) {
    registry.register(StepType::Validation, Arc::new(ValidationHandler));
    registry.register(StepType::Evaluation, Arc::new(EvaluationHandler));
    registry.register(StepType::Approval, Arc::new(ApprovalHandler));
    registry.register(
        StepType::Notification,
        Arc::new(NotificationHandler::new(notifier)),
    );
    registry.register(StepType::Decision, Arc::new(DecisionHandler));
    registry.register(StepType::Wait, Arc::new(WaitHandler));
}
