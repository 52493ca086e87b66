pub mod builtin;
pub mod interpolate;
pub mod notify;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::engine::types::{Context, StepDefinition, StepResult, StepType};
use notify::{LogNotifier, Notifier};

/// Executable capability bound to a step type.
///
/// A handler reads the context and publishes changes only through the
/// `output` of the returned result. Returning `Err` (or panicking) is a fault
/// that terminates the instance; a result whose own status is `Failed` is a
/// business outcome and does not, unless the engine is configured to halt on it.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Human-readable description.
    fn description(&self) -> &str {
        "Custom step handler"
    }

    /// Run the step against a snapshot of the instance context.
    async fn execute(&self, step: &StepDefinition, ctx: &Context) -> Result<StepResult>;
}

/// Registry mapping step types to handlers. Safe to update while workflows run.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<StepType, Arc<dyn StepHandler>>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the six built-in handlers, delivering
    /// notifications through the log.
    pub fn with_builtins() -> Self {
        Self::with_notifier(Arc::new(LogNotifier))
    }

    /// Built-in handlers with a caller-supplied notification transport.
    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        let registry = Self::new();
        builtin::register_all(&registry, notifier);
        registry
    }

    /// Install or replace the handler for `step_type`.
    pub fn register(&self, step_type: StepType, handler: Arc<dyn StepHandler>) {
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(step_type.clone(), handler)
            .is_some();
        info!(step_type = %step_type, replaced = replaced, "Registered step handler");
    }

    /// Look up the handler for a step type.
    pub fn get(&self, step_type: &StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(step_type)
            .cloned()
    }

    pub fn contains(&self, step_type: &StepType) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(step_type)
    }

    /// List all registered step types with descriptions, sorted by tag.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(tag, handler)| (tag.to_string(), handler.description().to_string()))
            .collect();
        entries.sort();
        entries
    }
}

/// Read a string list from a step's config, failing if the key holds anything else.
pub(crate) fn config_str_list<'a>(step: &'a StepDefinition, key: &str) -> Result<Vec<&'a str>> {
    match step.config.get(key) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    anyhow::anyhow!("{} '{}': every entry must be a string", step.step_type, key)
                })
            })
            .collect(),
        Some(_) => anyhow::bail!("{} requires '{}' to be a list", step.step_type, key),
    }
}
