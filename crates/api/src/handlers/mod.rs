//! Route handlers, one module per resource.

pub mod events;
pub mod runs;
pub mod workflows;

use axum::body::Bytes;
use serde_json::Value;

use crate::ApiError;

/// Trigger payload from an optional JSON body. An empty body is `Null`;
/// a non-empty body must parse.
pub(crate) fn trigger_payload(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {e}")))
}
