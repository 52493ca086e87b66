use std::time::Duration;

use thiserror::Error;

use crate::engine::types::StepType;

/// Failures produced by the workflow engine.
///
/// Only `DefinitionNotFound`, `InvalidDefinition` and `Store` ever reach a caller as
/// an `Err`. The remaining variants describe why a step or instance ended in `Failed`
/// and are recorded on the instance as text.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Invalid definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("No handler for step type: {0}")]
    NoHandler(StepType),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("Instance store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
