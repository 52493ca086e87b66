use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shared context threaded through every step of an instance: a JSON-compatible key-value store.
pub type Context = HashMap<String, serde_json::Value>;

/// Output published by a step handler, merged into the instance context.
pub type StepOutput = HashMap<String, serde_json::Value>;

/// Step type tag. The six built-in tags plus any caller-defined tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Validation,
    Evaluation,
    Approval,
    Notification,
    Decision,
    Wait,
    Custom(String),
}

impl StepType {
    pub const BUILTIN: [StepType; 6] = [
        StepType::Validation,
        StepType::Evaluation,
        StepType::Approval,
        StepType::Notification,
        StepType::Decision,
        StepType::Wait,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            StepType::Validation => "validation",
            StepType::Evaluation => "evaluation",
            StepType::Approval => "approval",
            StepType::Notification => "notification",
            StepType::Decision => "decision",
            StepType::Wait => "wait",
            StepType::Custom(tag) => tag,
        }
    }
}

impl From<&str> for StepType {
    fn from(tag: &str) -> Self {
        // Legacy tags from the case-file backend are accepted on input.
        match tag {
            "validation" | "validacion" => StepType::Validation,
            "evaluation" | "evaluacion" => StepType::Evaluation,
            "approval" | "aprobacion" => StepType::Approval,
            "notification" | "notificacion" => StepType::Notification,
            "decision" => StepType::Decision,
            "wait" | "espera" => StepType::Wait,
            other => StepType::Custom(other.to_string()),
        }
    }
}

impl From<String> for StepType {
    fn from(tag: String) -> Self {
        StepType::from(tag.as_str())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        match step_type {
            StepType::Custom(tag) => tag,
            builtin => builtin.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule selecting the step that runs after the current one.
///
/// Serialized as a bare index (`next: 3`) or as
/// `next: { condition: "amount > 5000", then: 2, else: 1 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transition {
    Sequential(usize),
    Conditional {
        condition: String,
        then: usize,
        #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<usize>,
    },
}

impl Transition {
    /// Every index this transition may jump to.
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Transition::Sequential(index) => vec![*index],
            Transition::Conditional {
                then, otherwise, ..
            } => std::iter::once(*then).chain(*otherwise).collect(),
        }
    }
}

/// Definition of a single step in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// `None` means "continue with the next step in order".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Transition>,
    /// Per-step deadline in seconds; overrides the engine-wide step timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<f64>,
}

impl StepDefinition {
    pub fn new(id: &str, step_type: StepType) -> Self {
        Self {
            id: id.to_string(),
            step_type,
            config: serde_json::Map::new(),
            next: None,
            timeout_s: None,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    pub fn with_next(mut self, next: Transition) -> Self {
        self.next = Some(next);
        self
    }
}

/// Complete, immutable workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Every structural problem with the definition: out-of-range transitions
    /// and step timeouts that are not a usable number of seconds.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.validate_transitions();
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(t) = step.timeout_s
                && std::time::Duration::try_from_secs_f64(t).is_err()
            {
                errors.push(format!(
                    "Step '{}' (index {}) has timeout_s {}, expected a non-negative number of seconds",
                    step.id, index, t
                ));
            }
        }
        errors
    }

    /// Check that every transition target lies in `[0, steps.len()]`.
    /// Index `steps.len()` means "complete".
    pub fn validate_transitions(&self) -> Vec<String> {
        let total = self.steps.len();
        let mut errors = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            let Some(next) = &step.next else { continue };
            for target in next.targets() {
                if target > total {
                    errors.push(format!(
                        "Step '{}' (index {}) jumps to {}, outside 0..={}",
                        step.id, index, target, total
                    ));
                }
            }
        }

        errors
    }
}

/// Status of a single step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Waiting,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Waiting => write!(f, "waiting"),
        }
    }
}

/// Result of one step invocation. Appended to the instance, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub output: StepOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(output: StepOutput) -> Self {
        Self {
            step_id: String::new(),
            status: StepStatus::Success,
            output,
            error: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failed(output: StepOutput, error: impl Into<String>) -> Self {
        Self {
            step_id: String::new(),
            status: StepStatus::Failed,
            output,
            error: Some(error.into()),
            executed_at: Utc::now(),
        }
    }

    pub fn waiting(output: StepOutput) -> Self {
        Self {
            status: StepStatus::Waiting,
            ..Self::success(output)
        }
    }

    pub(crate) fn fault(step_id: &str, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            ..Self::failed(StepOutput::new(), error)
        }
    }
}

/// Status of a workflow instance. `Running` moves one way to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceStatus::Running)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Completed => write!(f, "completed"),
            InstanceStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(InstanceStatus::Running),
            "completed" => Ok(InstanceStatus::Completed),
            "failed" => Ok(InstanceStatus::Failed),
            _ => Err(format!(
                "Invalid status '{}'. Use: running, completed, failed",
                s
            )),
        }
    }
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    pub definition_id: String,
    pub context: Context,
    /// Cursor: index of the next step to run.
    pub current_step: usize,
    /// Step count of the definition captured at start.
    pub total_steps: usize,
    pub status: InstanceStatus,
    pub results: Vec<StepResult>,
    /// Why the instance failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn new(id: &str, definition_id: &str, total_steps: usize, context: Context) -> Self {
        Self {
            id: id.to_string(),
            definition_id: definition_id.to_string(),
            context,
            current_step: 0,
            total_steps,
            status: InstanceStatus::Running,
            results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = InstanceStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Ids of the steps that actually ran, in order.
    pub fn executed_step_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.step_id.as_str()).collect()
    }

    /// The most recent result recorded for `step_id`. Later runs of the same id win.
    pub fn result_for(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().rev().find(|r| r.step_id == step_id)
    }

    pub fn status_view(&self) -> WorkflowStatus {
        WorkflowStatus {
            id: self.id.clone(),
            status: self.status,
            current_step: self.current_step,
            steps_executed: self.results.len(),
            progress: format!("{}/{}", self.current_step, self.total_steps),
        }
    }
}

/// Status projection returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: String,
    pub status: InstanceStatus,
    pub current_step: usize,
    pub steps_executed: usize,
    pub progress: String,
}
