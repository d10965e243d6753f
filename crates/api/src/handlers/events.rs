use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::trigger_payload;
use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub event: String,
    pub run_ids: Vec<Uuid>,
}

/// Start every enabled workflow listening for `event_type`. The request body
/// (if any) becomes the runs' trigger payload; a malformed body is rejected
/// before anything starts.
pub async fn dispatch(
    Path(event_type): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAccepted>), ApiError> {
    let payload = trigger_payload(&body)?;
    let handles = state.dispatcher.handle_event(&event_type, payload).await?;

    let accepted = EventAccepted {
        event: event_type,
        run_ids: handles.iter().map(|h| h.id).collect(),
    };
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
