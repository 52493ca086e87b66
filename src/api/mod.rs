mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::WorkflowEngine;

pub use errors::AppError;

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}

/// Build the API router over an engine.
pub fn router(engine: Arc<WorkflowEngine>, max_body: usize) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route(
            "/definitions",
            get(handlers::list_definitions).post(handlers::register_definition),
        )
        .route(
            "/workflows",
            get(handlers::list_workflows).post(handlers::start_workflow),
        )
        .route("/workflows/{id}", get(handlers::get_workflow))
        .route("/workflows/{id}/status", get(handlers::get_workflow_status))
        .route("/workflows/{id}/cancel", post(handlers::cancel_workflow))
        .route("/handlers", get(handlers::list_handlers))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server.
pub async fn serve(host: &str, port: u16, engine: Arc<WorkflowEngine>, max_body: usize) -> Result<()> {
    let app = router(engine, max_body);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Caseflow API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
