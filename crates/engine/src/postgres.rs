//! Postgres-backed [`DefinitionRegistry`] and [`RunStore`].
//!
//! Thin adapters over the `db` crate's repository functions: domain types go
//! in and out as JSONB, with a few columns duplicated for SQL filtering.

use async_trait::async_trait;
use db::models::{WorkflowRow, WorkflowRunRow};
use db::repository::{runs, workflows};
use db::{DbError, DbPool};
use uuid::Uuid;

use crate::models::{RunStatus, WorkflowDefinition, WorkflowRun};
use crate::store::{DefinitionRegistry, RunStore};
use crate::StoreError;

fn corrupt(id: Uuid, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        id,
        message: err.to_string(),
    }
}

fn optional<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DbError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

fn definition_to_row(definition: &WorkflowDefinition) -> Result<WorkflowRow, StoreError> {
    Ok(WorkflowRow {
        id: definition.id,
        name: definition.name.clone(),
        enabled: definition.enabled,
        trigger_type: definition.trigger.kind().to_owned(),
        event_name: definition.trigger.event_name().map(str::to_owned),
        definition: serde_json::to_value(definition).map_err(|e| corrupt(definition.id, e))?,
        created_at: definition.created_at,
        updated_at: definition.updated_at,
    })
}

fn definition_from_row(row: WorkflowRow) -> Result<WorkflowDefinition, StoreError> {
    serde_json::from_value(row.definition).map_err(|e| corrupt(row.id, e))
}

pub struct PgDefinitionRegistry {
    pool: DbPool,
}

impl PgDefinitionRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionRegistry for PgDefinitionRegistry {
    async fn create(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let row = definition_to_row(&definition)?;
        match workflows::insert_workflow(&self.pool, &row).await {
            Ok(saved) => definition_from_row(saved),
            Err(DbError::Conflict) => Err(StoreError::Conflict(definition.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError> {
        optional(workflows::get_workflow(&self.pool, id).await)?
            .map(definition_from_row)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        workflows::list_workflows(&self.pool)
            .await?
            .into_iter()
            .map(definition_from_row)
            .collect()
    }

    async fn update(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let row = definition_to_row(&definition)?;
        match workflows::update_workflow(&self.pool, &row).await {
            Ok(saved) => definition_from_row(saved),
            Err(DbError::NotFound) => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(optional(workflows::delete_workflow(&self.pool, id).await)?.is_some())
    }

    async fn list_enabled_by_trigger(
        &self,
        kind: &str,
        event: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        workflows::list_enabled_by_trigger(&self.pool, kind, event)
            .await?
            .into_iter()
            .map(definition_from_row)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

fn run_to_row(run: &WorkflowRun) -> Result<WorkflowRunRow, StoreError> {
    Ok(WorkflowRunRow {
        id: run.id,
        workflow_id: run.workflow_id,
        status: run.status.to_string(),
        started_at: run.started_at,
        completed_at: run.completed_at,
        error: run.error.clone(),
        logs: serde_json::to_value(&run.logs).map_err(|e| corrupt(run.id, e))?,
    })
}

fn run_from_row(row: WorkflowRunRow) -> Result<WorkflowRun, StoreError> {
    let status: RunStatus = row.status.parse().map_err(|e: String| corrupt(row.id, e))?;
    let logs = serde_json::from_value(row.logs).map_err(|e| corrupt(row.id, e))?;
    Ok(WorkflowRun {
        id: row.id,
        workflow_id: row.workflow_id,
        status,
        started_at: row.started_at,
        completed_at: row.completed_at,
        error: row.error,
        logs,
    })
}

pub struct PgRunStore {
    pool: DbPool,
}

impl PgRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn save(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        runs::upsert_run(&self.pool, &run_to_row(run)?).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        optional(runs::get_run(&self.pool, id).await)?
            .map(run_from_row)
            .transpose()
    }

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StoreError> {
        runs::list_runs_by_status(&self.pool, &RunStatus::Running.to_string())
            .await?
            .into_iter()
            .map(run_from_row)
            .collect()
    }

    async fn history(&self, workflow_id: Uuid, limit: usize) -> Result<Vec<WorkflowRun>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        runs::list_runs_for_workflow(&self.pool, workflow_id, limit)
            .await?
            .into_iter()
            .map(run_from_row)
            .collect()
    }
}
