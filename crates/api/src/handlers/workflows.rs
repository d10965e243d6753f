use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use engine::{DefinitionPatch, NewWorkflow, WorkflowDefinition, WorkflowRun};
use serde::Deserialize;
use uuid::Uuid;

use super::trigger_payload;
use crate::{ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WorkflowDefinition>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    Ok(Json(state.service.get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewWorkflow>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), ApiError> {
    let created = state.service.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(patch): Json<DefinitionPatch>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    Ok(Json(state.service.update(id, patch).await?))
}

pub async fn delete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fire-and-forget. Responds with the run as it looks right after creation.
pub async fn start(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<WorkflowRun>), ApiError> {
    let input = trigger_payload(&body)?;
    let handle = state.service.engine().start(id, input).await?;
    Ok((StatusCode::ACCEPTED, Json(handle.snapshot())))
}

/// Runs to completion and responds with the terminal run, failed or not.
pub async fn run(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WorkflowRun>, ApiError> {
    let input = trigger_payload(&body)?;
    Ok(Json(state.service.engine().run(id, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn runs(
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowRun>>, ApiError> {
    let history = state.service.engine().get_run_history(id, query.limit).await?;
    Ok(Json(history))
}
