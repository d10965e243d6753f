use axum::{
    extract::{Path, State},
    Json,
};
use engine::WorkflowRun;
use uuid::Uuid;

use crate::{ApiError, AppState};

pub async fn running(State(state): State<AppState>) -> Result<Json<Vec<WorkflowRun>>, ApiError> {
    Ok(Json(state.service.engine().list_running_runs().await?))
}

pub async fn get(
    Path(run_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowRun>, ApiError> {
    Ok(Json(state.service.engine().get_run(run_id).await?))
}
