//! Definition registry: workflow definitions keyed by definition id.
//!
//! Definitions are immutable once registered. Re-registering an id replaces
//! the entry; instances already running keep the `Arc` they captured.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::engine::error::EngineError;
use crate::engine::types::WorkflowDefinition;

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `definition` under `id`, replacing any previous entry.
    ///
    /// Fails with `InvalidDefinition` when a transition points past the end
    /// of the step list or a step timeout is negative or out of range.
    pub fn register(&self, id: &str, definition: WorkflowDefinition) -> Result<(), EngineError> {
        let errors = definition.validate();
        if !errors.is_empty() {
            return Err(EngineError::InvalidDefinition {
                id: id.to_string(),
                reason: errors.join("; "),
            });
        }

        let steps = definition.steps.len();
        let replaced = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Arc::new(definition))
            .is_some();

        info!(definition_id = %id, steps = steps, replaced = replaced, "Registered workflow definition");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// All registered definitions as `(registration id, definition)`, sorted by id.
    pub fn list(&self) -> Vec<(String, Arc<WorkflowDefinition>)> {
        let mut entries: Vec<(String, Arc<WorkflowDefinition>)> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, def)| (id.clone(), def.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn count(&self) -> usize {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{StepDefinition, StepType, Transition};

    fn definition(name: &str, steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: name.to_string(),
            name: name.to_string(),
            steps,
        }
    }

    #[test]
    fn test_register_and_replace() {
        let registry = DefinitionRegistry::new();
        registry
            .register("intake", definition("v1", vec![]))
            .unwrap();
        let first = registry.get("intake").unwrap();

        registry
            .register(
                "intake",
                definition("v2", vec![StepDefinition::new("a", StepType::Decision)]),
            )
            .unwrap();

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get("intake").unwrap().name, "v2");
        // Holders of the old Arc are unaffected.
        assert_eq!(first.name, "v1");
    }

    #[test]
    fn test_completion_index_is_in_range() {
        let registry = DefinitionRegistry::new();
        let def = definition(
            "d",
            vec![StepDefinition::new("a", StepType::Decision).with_next(Transition::Sequential(1))],
        );
        assert!(registry.register("d", def).is_ok());
    }

    #[test]
    fn test_out_of_range_target_rejected() {
        let registry = DefinitionRegistry::new();
        let def = definition(
            "d",
            vec![
                StepDefinition::new("a", StepType::Decision).with_next(Transition::Conditional {
                    condition: "x > 1".into(),
                    then: 1,
                    otherwise: Some(7),
                }),
            ],
        );

        let err = registry.register("d", def).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition { .. }));
        assert!(err.to_string().contains("jumps to 7"));
        assert!(!registry.contains("d"));
    }

    #[test]
    fn test_unusable_step_timeout_rejected() {
        let registry = DefinitionRegistry::new();
        for timeout in [-1.0, f64::NAN, 1e20] {
            let mut step = StepDefinition::new("slow", StepType::Wait);
            step.timeout_s = Some(timeout);

            let err = registry
                .register("d", definition("d", vec![step]))
                .unwrap_err();
            assert!(err.to_string().contains("timeout_s"), "accepted {}", timeout);
        }
        assert!(!registry.contains("d"));

        let mut step = StepDefinition::new("slow", StepType::Wait);
        step.timeout_s = Some(0.5);
        assert!(registry.register("d", definition("d", vec![step])).is_ok());
    }

    #[test]
    fn test_list_sorted_by_id() {
        let registry = DefinitionRegistry::new();
        registry.register("b", definition("b", vec![])).unwrap();
        registry.register("a", definition("a", vec![])).unwrap();

        let ids: Vec<String> = registry.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
