//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::schedule::ScheduleError;

/// A definition that cannot be registered or executed as written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    // ------ Trigger errors ------

    /// The schedule expression does not parse or never fires.
    #[error("invalid schedule expression '{expression}': {source}")]
    InvalidSchedule {
        expression: String,
        #[source]
        source: ScheduleError,
    },

    #[error("event trigger requires a non-empty event name")]
    EmptyEventName,

    #[error("workflow name must not be empty")]
    EmptyName,

    // ------ Action graph errors ------

    /// Two or more actions share the same ID.
    #[error("duplicate action ID: '{0}'")]
    DuplicateActionId(String),

    /// The ID collides with the source name of pipeline-level log entries.
    #[error("action ID '{0}' is reserved")]
    ReservedActionId(String),

    /// `next_actions` names an action that isn't in the workflow.
    #[error("action '{action_id}' lists unknown next action '{next}'")]
    UnknownNextAction { action_id: String, next: String },

    /// Following successors from some action leads back to it.
    #[error("action graph contains a cycle")]
    CycleDetected,
}

/// Persistence failures, independent of the backing technology.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record {0} already exists")]
    Conflict(Uuid),

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt record {id}: {message}")]
    Corrupt { id: Uuid, message: String },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

/// Errors produced by the workflow engine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}
