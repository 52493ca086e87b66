use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::engine::cancel::CancelToken;
use crate::engine::definitions::DefinitionRegistry;
use crate::engine::error::EngineError;
use crate::engine::transition;
use crate::engine::types::*;
use crate::steps::{HandlerRegistry, StepHandler};
use crate::storage::InstanceStore;
use crate::storage::memory::MemoryInstanceStore;

/// Runtime knobs for the execution loop.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Treat a handler-reported `Failed` result as fatal for the instance.
    /// Off by default: such results are recorded as `Success` and the chain continues.
    pub halt_on_step_failure: bool,
    /// Default deadline per step. A step's own `timeout_s` takes precedence.
    pub step_timeout: Option<Duration>,
    /// Deadline for a whole instance, measured from `start_workflow`.
    pub instance_timeout: Option<Duration>,
    /// Maximum number of step invocations per instance; bounds back-jump loops.
    pub max_steps: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            halt_on_step_failure: false,
            step_timeout: None,
            instance_timeout: None,
            max_steps: 10_000,
        }
    }
}

/// The workflow execution engine.
///
/// Owns the definition table and handler registry; instances live in the
/// instance store. Share it behind an `Arc` to run instances concurrently.
pub struct WorkflowEngine {
    definitions: DefinitionRegistry,
    handlers: Arc<HandlerRegistry>,
    store: Arc<dyn InstanceStore>,
    options: EngineOptions,
    running: DashMap<String, CancelToken>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(
            Arc::new(HandlerRegistry::with_builtins()),
            Arc::new(MemoryInstanceStore::new()),
        )
    }
}

impl WorkflowEngine {
    pub fn new(handlers: Arc<HandlerRegistry>, store: Arc<dyn InstanceStore>) -> Self {
        Self {
            definitions: DefinitionRegistry::new(),
            handlers,
            store,
            options: EngineOptions::default(),
            running: DashMap::new(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    /// Register (or replace) a workflow definition under `id`.
    pub fn register_definition(
        &self,
        id: &str,
        definition: WorkflowDefinition,
    ) -> Result<(), EngineError> {
        self.definitions.register(id, definition)
    }

    /// Install or override the handler for a step type.
    pub fn register_handler(&self, step_type: impl Into<StepType>, handler: Arc<dyn StepHandler>) {
        self.handlers.register(step_type.into(), handler);
    }

    /// Create an instance of `definition_id` under `workflow_id` and run it to a
    /// terminal state. Step failures end up in the returned instance, not in `Err`.
    pub async fn start_workflow(
        &self,
        definition_id: &str,
        workflow_id: &str,
        context: Context,
    ) -> Result<WorkflowInstance, EngineError> {
        self.start_workflow_with_cancel(definition_id, workflow_id, context, CancelToken::new())
            .await
    }

    /// Like `start_workflow`, with a caller-owned cancellation token.
    pub async fn start_workflow_with_cancel(
        &self,
        definition_id: &str,
        workflow_id: &str,
        context: Context,
        cancel: CancelToken,
    ) -> Result<WorkflowInstance, EngineError> {
        let definition = self
            .definitions
            .get(definition_id)
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.to_string()))?;

        let mut instance =
            WorkflowInstance::new(workflow_id, definition_id, definition.steps.len(), context);

        self.running.insert(workflow_id.to_string(), cancel.clone());
        let mut guard = RunGuard {
            running: &self.running,
            store: self.store.clone(),
            workflow_id: workflow_id.to_string(),
            started_at: instance.started_at,
            cancel: cancel.clone(),
            finished: false,
        };

        // Overwrites any earlier instance with the same id.
        if let Err(e) = self.store.save(&instance).await {
            guard.finished = true;
            return Err(e.into());
        }

        info!(
            workflow_id = %workflow_id,
            definition_id = %definition_id,
            steps = definition.steps.len(),
            "Starting workflow"
        );

        let outcome = self.run(&definition, &mut instance, &cancel).await;
        guard.finished = true;
        drop(guard);
        outcome?;

        info!(
            workflow_id = %workflow_id,
            status = %instance.status,
            steps_executed = instance.results.len(),
            "Workflow finished"
        );

        Ok(instance)
    }

    /// Status projection for a workflow id, `None` if unknown.
    pub async fn get_status(&self, workflow_id: &str) -> Result<Option<WorkflowStatus>, EngineError> {
        Ok(self
            .store
            .get(workflow_id)
            .await?
            .map(|instance| instance.status_view()))
    }

    /// Full instance for a workflow id, `None` if unknown.
    pub async fn get_instance(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowInstance>, EngineError> {
        Ok(self.store.get(workflow_id).await?)
    }

    pub async fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<WorkflowInstance>, EngineError> {
        Ok(self.store.list(status).await?)
    }

    /// Request cancellation of a running instance. Returns `false` if no
    /// instance with this id is running.
    pub fn cancel(&self, workflow_id: &str) -> bool {
        match self.running.get(workflow_id) {
            Some(token) => {
                token.cancel();
                info!(workflow_id = %workflow_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.running.contains_key(workflow_id)
    }

    /// The execution loop. Steps run one at a time; the store gets a snapshot
    /// after each one so status queries can follow progress.
    async fn run(
        &self,
        definition: &WorkflowDefinition,
        instance: &mut WorkflowInstance,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        let deadline = self
            .options
            .instance_timeout
            .and_then(|limit| Some((Instant::now().checked_add(limit)?, limit)));
        let mut invoked = 0usize;

        loop {
            let cursor = instance.current_step;

            if cursor >= definition.steps.len() {
                instance.complete();
                break;
            }

            if cancel.is_cancelled() {
                warn!(workflow_id = %instance.id, cursor = cursor, "Workflow cancelled before step");
                instance.fail(EngineError::Cancelled.to_string());
                break;
            }

            if let Some((at, limit)) = deadline
                && Instant::now() >= at
            {
                warn!(workflow_id = %instance.id, cursor = cursor, "Workflow deadline exceeded");
                instance.fail(EngineError::DeadlineExceeded(limit).to_string());
                break;
            }

            if invoked >= self.options.max_steps {
                warn!(workflow_id = %instance.id, max_steps = self.options.max_steps, "Step limit reached");
                instance.fail(EngineError::StepLimitExceeded(self.options.max_steps).to_string());
                break;
            }

            let step = &definition.steps[cursor];
            invoked += 1;

            info!(
                workflow_id = %instance.id,
                step = %step.id,
                step_type = %step.step_type,
                cursor = cursor,
                "Executing step"
            );

            match self.dispatch(step, &instance.context, cancel, deadline).await {
                Ok(mut result) => {
                    result.step_id = step.id.clone();
                    for (k, v) in &result.output {
                        instance.context.insert(k.clone(), v.clone());
                    }

                    if result.status == StepStatus::Failed && self.options.halt_on_step_failure {
                        let reason = result
                            .error
                            .get_or_insert_with(|| "step reported failure".to_string())
                            .clone();
                        warn!(workflow_id = %instance.id, step = %step.id, error = %reason, "Step reported failure, halting");
                        instance.results.push(result);
                        instance.fail(format!("Step '{}' failed: {}", step.id, reason));
                        break;
                    }

                    if result.status == StepStatus::Failed {
                        info!(
                            workflow_id = %instance.id,
                            step = %step.id,
                            error = result.error.as_deref().unwrap_or(""),
                            "Step reported failure, continuing"
                        );
                    }

                    // Any handler return that did not fault counts as success.
                    result.status = StepStatus::Success;
                    result.error = None;
                    instance.results.push(result);

                    instance.current_step = transition::next_index(step, cursor, &instance.context);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(workflow_id = %instance.id, step = %step.id, error = %message, "Step failed");
                    instance.results.push(StepResult::fault(&step.id, &message));
                    instance.fail(format!("Step '{}' failed: {}", step.id, message));
                    break;
                }
            }

            self.store.save(instance).await?;
        }

        self.store.save(instance).await?;
        Ok(())
    }

    /// Invoke the handler for one step on its own task, racing it against
    /// cancellation and the applicable deadline.
    async fn dispatch(
        &self,
        step: &StepDefinition,
        ctx: &Context,
        cancel: &CancelToken,
        instance_deadline: Option<(Instant, Duration)>,
    ) -> anyhow::Result<StepResult> {
        let handler = self
            .handlers
            .get(&step.step_type)
            .ok_or_else(|| EngineError::NoHandler(step.step_type.clone()))?;

        // Registration rejects unusable `timeout_s` values.
        let step_limit = step
            .timeout_s
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .or(self.options.step_timeout)
            .and_then(|limit| Some((Instant::now().checked_add(limit)?, limit)));

        let deadline = match (step_limit, instance_deadline) {
            (Some(s), Some(i)) => Some(if s.0 <= i.0 { s } else { i }),
            (s, i) => s.or(i),
        };

        let owned_step = step.clone();
        let snapshot = ctx.clone();
        let mut task =
            tokio::spawn(async move { handler.execute(&owned_step, &snapshot).await });
        // Stops the handler however this future ends, including being dropped.
        let _abort = AbortOnDrop(task.abort_handle());

        let timer = async move {
            match deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    Err(EngineError::HandlerPanicked(panic_message(e.into_panic())).into())
                }
                Err(e) => Err(anyhow!("Handler task aborted: {}", e)),
            },
            _ = cancel.cancelled() => {
                Err(EngineError::Cancelled.into())
            }
            _ = timer => {
                let limit = deadline.map(|(_, limit)| limit).unwrap_or_default();
                Err(EngineError::DeadlineExceeded(limit).into())
            }
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Unregisters a running instance when `start_workflow` returns.
///
/// If the future was dropped before the loop finished (a disconnected HTTP
/// client, an outer timeout), the token is tripped and the last stored
/// snapshot is moved from `Running` to `Failed` on a background task.
struct RunGuard<'a> {
    running: &'a DashMap<String, CancelToken>,
    store: Arc<dyn InstanceStore>,
    workflow_id: String,
    started_at: DateTime<Utc>,
    cancel: CancelToken,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running
            .remove_if(&self.workflow_id, |_, token| token.same_as(&self.cancel));
        if self.finished {
            return;
        }

        self.cancel.cancel();
        warn!(workflow_id = %self.workflow_id, "Workflow abandoned before finishing");

        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let workflow_id = std::mem::take(&mut self.workflow_id);
        let started_at = self.started_at;
        runtime.spawn(async move {
            match store.get(&workflow_id).await {
                // A newer run under the same id is left alone.
                Ok(Some(mut instance))
                    if instance.status == InstanceStatus::Running
                        && instance.started_at == started_at =>
                {
                    instance.fail(EngineError::Cancelled.to_string());
                    if let Err(e) = store.save(&instance).await {
                        error!(workflow_id = %workflow_id, error = %format!("{:#}", e), "Failed to save abandoned workflow");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(workflow_id = %workflow_id, error = %format!("{:#}", e), "Failed to load abandoned workflow");
                }
            }
        });
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
