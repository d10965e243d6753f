//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   GET    /health
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/{id}
//!   PATCH  /api/v1/workflows/{id}
//!   DELETE /api/v1/workflows/{id}
//!   POST   /api/v1/workflows/{id}/start
//!   POST   /api/v1/workflows/{id}/run
//!   GET    /api/v1/workflows/{id}/runs?limit=N
//!   GET    /api/v1/runs/running
//!   GET    /api/v1/runs/{run_id}
//!   POST   /api/v1/events/{event_type}

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Json, Router,
};
use engine::{EventDispatcher, WorkflowService};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::ApiError;
use handlers::{events, runs, workflows};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: WorkflowService,
    pub dispatcher: EventDispatcher,
}

impl AppState {
    pub fn new(service: WorkflowService) -> Self {
        let dispatcher = EventDispatcher::new(service.engine().clone());
        Self { service, dispatcher }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflows", get(workflows::list).post(workflows::create))
        .route(
            "/workflows/:id",
            get(workflows::get)
                .patch(workflows::update)
                .delete(workflows::delete),
        )
        .route("/workflows/:id/start", post(workflows::start))
        .route("/workflows/:id/run", post(workflows::run))
        .route("/workflows/:id/runs", get(workflows::runs))
        .route("/runs/running", get(runs::running))
        .route("/runs/:run_id", get(runs::get))
        .route("/events/:event_type", post(events::dispatch));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod api_tests;
