//! Tests for the built-in step handlers and the handler registry.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use caseflow::engine::types::*;
use caseflow::steps::builtin::*;
use caseflow::steps::notify::Notifier;
use caseflow::steps::{HandlerRegistry, StepHandler};
use caseflow::WorkflowEngine;

fn ctx(value: serde_json::Value) -> Context {
    serde_json::from_value(value).unwrap()
}

fn step(step_type: StepType, config: serde_json::Value) -> StepDefinition {
    StepDefinition::new("step", step_type).with_config(config)
}

/// Collects every delivered notification.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipients: &[String], message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), message.to_string()));
        Ok(())
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _recipients: &[String], _message: &str) -> Result<()> {
        anyhow::bail!("smtp relay refused connection")
    }
}

// --- Validation ---

#[tokio::test]
async fn validation_all_present() {
    let result = ValidationHandler
        .execute(
            &step(StepType::Validation, json!({"required_fields": ["name", "email"]})),
            &ctx(json!({"name": "John", "email": "john@example.com"})),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["valid"], json!(true));
    assert_eq!(result.output["missing_fields"], json!([]));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn validation_reports_missing_in_declared_order() {
    let result = ValidationHandler
        .execute(
            &step(
                StepType::Validation,
                json!({"required_fields": ["name", "email", "phone"]}),
            ),
            &ctx(json!({"email": "x@y.z"})),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.output["valid"], json!(false));
    assert_eq!(result.output["missing_fields"], json!(["name", "phone"]));
    assert_eq!(result.error.as_deref(), Some("Missing: name, phone"));
}

#[tokio::test]
async fn validation_present_null_counts_as_present() {
    let result = ValidationHandler
        .execute(
            &step(StepType::Validation, json!({"required_fields": ["name"]})),
            &ctx(json!({"name": null})),
        )
        .await
        .unwrap();

    assert_eq!(result.output["valid"], json!(true));
}

#[tokio::test]
async fn validation_checks_top_level_keys_only() {
    let result = ValidationHandler
        .execute(
            &step(StepType::Validation, json!({"required_fields": ["applicant.name"]})),
            &ctx(json!({"applicant": {"name": "Ana"}})),
        )
        .await
        .unwrap();

    assert_eq!(result.output["valid"], json!(false));
    assert_eq!(result.output["missing_fields"], json!(["applicant.name"]));

    let result = ValidationHandler
        .execute(
            &step(StepType::Validation, json!({"required_fields": ["applicant.name"]})),
            &ctx(json!({"applicant.name": "Ana"})),
        )
        .await
        .unwrap();

    assert_eq!(result.output["valid"], json!(true));
}

#[tokio::test]
async fn validation_without_config_is_valid() {
    let result = ValidationHandler
        .execute(&step(StepType::Validation, json!({})), &Context::new())
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["valid"], json!(true));
}

#[tokio::test]
async fn validation_rejects_non_list_config() {
    let err = ValidationHandler
        .execute(
            &step(StepType::Validation, json!({"required_fields": "name"})),
            &Context::new(),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("required_fields"));
}

// --- Evaluation ---

#[tokio::test]
async fn evaluation_counts_matches() {
    let config = json!({
        "criteria": [
            {"name": "score", "field": "score", "value": 85},
            {"name": "age", "field": "age", "value": 25},
        ]
    });

    let result = EvaluationHandler
        .execute(
            &step(StepType::Evaluation, config),
            &ctx(json!({"score": 85, "age": 25})),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["criteria_met"], json!(2));
    assert_eq!(result.output["total_criteria"], json!(2));
    assert_eq!(
        result.output["details"],
        json!([
            {"criterion": "score", "met": true},
            {"criterion": "age", "met": true},
        ])
    );
}

#[tokio::test]
async fn evaluation_partial_and_missing_fields() {
    let config = json!({
        "criteria": [
            {"name": "score", "field": "score", "value": 85},
            {"name": "country", "field": "country", "value": "CL"},
            {"name": "flagged", "field": "flag", "value": null},
        ]
    });

    let result = EvaluationHandler
        .execute(&step(StepType::Evaluation, config), &ctx(json!({"score": 70})))
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["criteria_met"], json!(1));
    assert_eq!(result.output["details"][0]["met"], json!(false));
    assert_eq!(result.output["details"][2]["met"], json!(true));
}

#[tokio::test]
async fn evaluation_integer_and_float_are_equal() {
    let config = json!({"criteria": [{"name": "age", "field": "age", "value": 25}]});

    let result = EvaluationHandler
        .execute(&step(StepType::Evaluation, config), &ctx(json!({"age": 25.0})))
        .await
        .unwrap();

    assert_eq!(result.output["criteria_met"], json!(1));
}

#[tokio::test]
async fn evaluation_does_not_coerce_strings() {
    let config = json!({"criteria": [{"name": "age", "field": "age", "value": 25}]});

    let result = EvaluationHandler
        .execute(&step(StepType::Evaluation, config), &ctx(json!({"age": "25"})))
        .await
        .unwrap();

    assert_eq!(result.output["criteria_met"], json!(0));
}

// --- Approval ---

#[tokio::test]
async fn approval_records_role() {
    let result = ApprovalHandler
        .execute(
            &step(StepType::Approval, json!({"required_role": "manager"})),
            &Context::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["approved"], json!(true));
    assert_eq!(result.output["role"], json!("manager"));
}

#[tokio::test]
async fn approval_defaults_to_admin() {
    let result = ApprovalHandler
        .execute(&step(StepType::Approval, json!({})), &Context::new())
        .await
        .unwrap();

    assert_eq!(result.output["role"], json!("admin"));
}

// --- Notification ---

#[tokio::test]
async fn notification_delivers_rendered_message() {
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = NotificationHandler::new(notifier.clone());

    let result = handler
        .execute(
            &step(
                StepType::Notification,
                json!({
                    "recipients": ["user@example.com", "admin@example.com"],
                    "message": "Hello ${name}, case ${case.number} is ready"
                }),
            ),
            &ctx(json!({"name": "Ana", "case": {"number": 42}})),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["notified"], json!(2));

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, vec!["user@example.com", "admin@example.com"]);
    assert_eq!(sent[0].1, "Hello Ana, case 42 is ready");
}

#[tokio::test]
async fn notification_without_recipients() {
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = NotificationHandler::new(notifier);

    let result = handler
        .execute(&step(StepType::Notification, json!({})), &Context::new())
        .await
        .unwrap();

    assert_eq!(result.output["notified"], json!(0));
}

#[tokio::test]
async fn notification_delivery_failure_is_not_a_step_failure() {
    let handler = NotificationHandler::new(Arc::new(BrokenNotifier));

    let result = handler
        .execute(
            &step(StepType::Notification, json!({"recipients": ["a@b.c"]})),
            &Context::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["notified"], json!(1));
}

// --- Decision and wait ---

#[tokio::test]
async fn decision_is_a_no_op() {
    let result = DecisionHandler
        .execute(&step(StepType::Decision, json!({"anything": 1})), &ctx(json!({"x": 1})))
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn wait_reports_duration() {
    let result = WaitHandler
        .execute(
            &step(StepType::Wait, json!({"duration_seconds": 0.01})),
            &Context::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.output["waited_seconds"], json!(0.01));
}

#[tokio::test]
async fn wait_zero_returns_promptly() {
    let result = WaitHandler
        .execute(&step(StepType::Wait, json!({"duration_seconds": 0})), &Context::new())
        .await
        .unwrap();

    assert_eq!(result.output["waited_seconds"], json!(0));
}

#[tokio::test]
async fn wait_rejects_negative_duration() {
    let err = WaitHandler
        .execute(
            &step(StepType::Wait, json!({"duration_seconds": -5})),
            &Context::new(),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("non-negative"));

    let err = WaitHandler
        .execute(
            &step(StepType::Wait, json!({"duration_seconds": 1e20})),
            &Context::new(),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("non-negative"));
}

#[tokio::test]
async fn wait_rejects_non_numeric_duration() {
    let err = WaitHandler
        .execute(
            &step(StepType::Wait, json!({"duration_seconds": "soon"})),
            &Context::new(),
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("duration_seconds"));
}

// --- Registry ---

#[test]
fn builtins_registered() {
    let registry = HandlerRegistry::with_builtins();
    for step_type in StepType::BUILTIN {
        assert!(registry.contains(&step_type), "missing {}", step_type);
    }
    assert_eq!(registry.list().len(), 6);
}

#[test]
fn empty_registry_has_nothing() {
    let registry = HandlerRegistry::new();
    assert!(registry.get(&StepType::Decision).is_none());
    assert!(registry.list().is_empty());
}

#[test]
fn list_is_sorted_with_descriptions() {
    let registry = HandlerRegistry::with_builtins();
    let names: Vec<String> = registry.list().into_iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec!["approval", "decision", "evaluation", "notification", "validation", "wait"]
    );
    assert!(registry.list().iter().all(|(_, desc)| !desc.is_empty()));
}

#[test]
fn custom_type_registration() {
    struct Sign;

    #[async_trait]
    impl StepHandler for Sign {
        async fn execute(&self, _step: &StepDefinition, _ctx: &Context) -> Result<StepResult> {
            Ok(StepResult::success(StepOutput::new()))
        }
    }

    let registry = HandlerRegistry::with_builtins();
    registry.register(StepType::from("digital_signature"), Arc::new(Sign));

    assert!(registry.contains(&StepType::Custom("digital_signature".into())));
    let listed = registry.list();
    let entry = listed
        .iter()
        .find(|(name, _)| name == "digital_signature")
        .unwrap();
    assert_eq!(entry.1, "Custom step handler");
}

#[tokio::test]
async fn engine_uses_supplied_notifier() {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = WorkflowEngine::new(
        Arc::new(HandlerRegistry::with_notifier(notifier.clone())),
        Arc::new(caseflow::storage::memory::MemoryInstanceStore::new()),
    );

    let definition = WorkflowDefinition {
        id: "notify".into(),
        name: "Notify".into(),
        steps: vec![
            step(
                StepType::Notification,
                json!({"recipients": ["ops@example.com"], "message": "Case ${id} opened"}),
            ),
        ],
    };
    engine.register_definition("notify", definition).unwrap();

    let instance = engine
        .start_workflow("notify", "wf", ctx(json!({"id": "T-7"})))
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].1, "Case T-7 opened");
}
