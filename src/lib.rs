//! Case-file workflow engine.
//!
//! A [`WorkflowDefinition`](engine::types::WorkflowDefinition) is an ordered list
//! of typed steps. Each step is dispatched to the [`StepHandler`](steps::StepHandler)
//! registered for its type, its output is merged into the instance context, and its
//! transition picks the next step, optionally through a condition over the context.

pub mod api;
pub mod cli;
pub mod engine;
pub mod expr;
pub mod steps;
pub mod storage;

pub use engine::{CancelToken, EngineError, EngineOptions, WorkflowEngine};
