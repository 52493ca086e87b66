pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::types::{InstanceStatus, WorkflowInstance};

/// Trait for workflow instance storage.
///
/// The engine writes a snapshot of each instance on start, after every step
/// and on its terminal status. Hosts that want durability or an audit trail
/// implement this over their own backend.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert or overwrite the instance under its id (last writer wins).
    async fn save(&self, instance: &WorkflowInstance) -> Result<()>;

    /// Fetch an instance by workflow id.
    async fn get(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>>;

    /// List instances, optionally filtered by status, newest first.
    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<WorkflowInstance>>;

    /// Remove an instance. Returns whether it existed.
    async fn delete(&self, workflow_id: &str) -> Result<bool>;
}
