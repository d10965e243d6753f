//! Workflow definition CRUD operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str =
    "id, name, enabled, trigger_type, event_name, definition, created_at, updated_at";

/// Insert a new workflow row. The caller supplies id and timestamps.
pub async fn insert_workflow(pool: &PgPool, row: &WorkflowRow) -> Result<WorkflowRow, DbError> {
    let sql = format!(
        "INSERT INTO workflows ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(row.id)
        .bind(&row.name)
        .bind(row.enabled)
        .bind(&row.trigger_type)
        .bind(&row.event_name)
        .bind(&row.definition)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(pool)
        .await
        .map_err(DbError::from_insert)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
    sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflows ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, WorkflowRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Enabled workflows with the given trigger type, optionally narrowed to one event name.
pub async fn list_enabled_by_trigger(
    pool: &PgPool,
    trigger_type: &str,
    event_name: Option<&str>,
) -> Result<Vec<WorkflowRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM workflows \
         WHERE enabled AND trigger_type = $1 AND ($2::text IS NULL OR event_name = $2) \
         ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(trigger_type)
        .bind(event_name)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Overwrite every mutable column of an existing workflow.
///
/// Returns `DbError::NotFound` if no row matched.
pub async fn update_workflow(pool: &PgPool, row: &WorkflowRow) -> Result<WorkflowRow, DbError> {
    let sql = format!(
        "UPDATE workflows \
         SET name = $2, enabled = $3, trigger_type = $4, event_name = $5, definition = $6, updated_at = $7 \
         WHERE id = $1 RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(row.id)
        .bind(&row.name)
        .bind(row.enabled)
        .bind(&row.trigger_type)
        .bind(&row.event_name)
        .bind(&row.definition)
        .bind(row.updated_at)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
