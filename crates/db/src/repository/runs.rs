//! Workflow run repository functions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRunRow, DbError};

const COLUMNS: &str = "id, workflow_id, status, started_at, completed_at, error, logs";

/// Insert or overwrite a run row. Runs are written on every state change
/// and log append, so this is the only write path.
pub async fn upsert_run(pool: &PgPool, row: &WorkflowRunRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_runs (id, workflow_id, status, started_at, completed_at, error, logs)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            completed_at = EXCLUDED.completed_at,
            error = EXCLUDED.error,
            logs = EXCLUDED.logs
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.status)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(&row.error)
    .bind(&row.logs)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<WorkflowRunRow, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflow_runs WHERE id = $1");
    sqlx::query_as::<_, WorkflowRunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Runs with the given status, oldest first.
pub async fn list_runs_by_status(
    pool: &PgPool,
    status: &str,
) -> Result<Vec<WorkflowRunRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM workflow_runs WHERE status = $1 ORDER BY started_at ASC");
    let rows = sqlx::query_as::<_, WorkflowRunRow>(&sql)
        .bind(status)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// The most recent `limit` runs of one workflow, newest first.
pub async fn list_runs_for_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
    limit: i64,
) -> Result<Vec<WorkflowRunRow>, DbError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM workflow_runs WHERE workflow_id = $1 \
         ORDER BY started_at DESC, id DESC LIMIT $2"
    );
    let rows = sqlx::query_as::<_, WorkflowRunRow>(&sql)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
