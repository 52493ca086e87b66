pub mod cancel;
pub mod definitions;
pub mod error;
pub mod executor;
pub mod loader;
pub mod transition;
pub mod types;

pub use cancel::CancelToken;
pub use error::EngineError;
pub use executor::{EngineOptions, WorkflowEngine};
