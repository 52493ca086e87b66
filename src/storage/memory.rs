use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::engine::types::{InstanceStatus, WorkflowInstance};
use crate::storage::InstanceStore;

/// In-memory instance store backed by a concurrent map.
/// Holds instances only for the lifetime of the process.
#[derive(Default)]
pub struct MemoryInstanceStore {
    instances: DashMap<String, WorkflowInstance>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn save(&self, instance: &WorkflowInstance) -> Result<()> {
        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn get(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>> {
        Ok(self.instances.get(workflow_id).map(|entry| entry.clone()))
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<WorkflowInstance>> {
        let mut instances: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();

        instances.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(instances)
    }

    async fn delete(&self, workflow_id: &str) -> Result<bool> {
        Ok(self.instances.remove(workflow_id).is_some())
    }
}
