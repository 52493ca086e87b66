use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::engine::types::{Context, InstanceStatus, WorkflowDefinition, WorkflowInstance, WorkflowStatus};

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct StartWorkflowRequest {
    pub definition_id: String,
    /// Instance id; a random UUID when omitted.
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Initial context for the workflow.
    #[serde(default)]
    pub context: Option<Context>,
}

#[derive(Serialize)]
pub struct RegisterDefinitionResponse {
    pub registered: String,
    pub steps: usize,
}

#[derive(Deserialize)]
pub struct ListWorkflowsQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct HandlerInfo {
    pub step_type: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Handlers ---

/// POST /definitions
pub async fn register_definition(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<Json<RegisterDefinitionResponse>, AppError> {
    if definition.id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Definition 'id' must not be empty".to_string(),
        ));
    }

    let id = definition.id.clone();
    let steps = definition.steps.len();
    state.engine.register_definition(&id, definition)?;

    Ok(Json(RegisterDefinitionResponse {
        registered: id,
        steps,
    }))
}

/// GET /definitions
pub async fn list_definitions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let definitions: Vec<serde_json::Value> = state
        .engine
        .definitions()
        .list()
        .iter()
        .map(|(id, def)| {
            serde_json::json!({
                "id": id,
                "name": def.name,
                "steps": def.steps.len(),
            })
        })
        .collect();

    let total = definitions.len();
    Json(serde_json::json!({
        "definitions": definitions,
        "total": total,
    }))
}

/// POST /workflows
pub async fn start_workflow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartWorkflowRequest>,
) -> Result<Json<WorkflowInstance>, AppError> {
    let workflow_id = req
        .workflow_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let instance = state
        .engine
        .start_workflow(
            &req.definition_id,
            &workflow_id,
            req.context.unwrap_or_default(),
        )
        .await?;

    Ok(Json(instance))
}

/// GET /workflows
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListWorkflowsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status_filter = params
        .status
        .as_deref()
        .map(str::parse::<InstanceStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let instances = state.engine.list_instances(status_filter).await?;

    // Summary view without context or step outputs
    let summaries: Vec<serde_json::Value> = instances
        .iter()
        .map(|i| {
            serde_json::json!({
                "id": i.id,
                "definition_id": i.definition_id,
                "status": i.status,
                "progress": i.status_view().progress,
                "started_at": i.started_at,
                "completed_at": i.completed_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "workflows": summaries,
        "total": summaries.len(),
    })))
}

/// GET /workflows/{id}
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowInstance>, AppError> {
    state
        .engine
        .get_instance(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Workflow '{}' not found", id)))
}

/// GET /workflows/{id}/status
pub async fn get_workflow_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatus>, AppError> {
    state
        .engine
        .get_status(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Workflow '{}' not found", id)))
}

/// POST /workflows/{id}/cancel
pub async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.engine.cancel(&id) {
        return Err(AppError::NotFound(format!(
            "Workflow '{}' is not running",
            id
        )));
    }

    Ok(Json(serde_json::json!({
        "cancelled": id,
    })))
}

/// GET /handlers
pub async fn list_handlers(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let handlers: Vec<HandlerInfo> = state
        .engine
        .handlers()
        .list()
        .into_iter()
        .map(|(step_type, description)| HandlerInfo {
            step_type,
            description,
        })
        .collect();

    let total = handlers.len();
    Json(serde_json::json!({
        "handlers": handlers,
        "total": total,
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
