//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and a run look
//! like in memory.  Definitions serialise to/from the JSONB `definition`
//! column of the `workflows` table; runs to the `workflow_runs` table.

use actions::ActionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Log source used for pipeline-level start/completion/failure entries.
pub const SYSTEM_SOURCE: &str = "system";

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Started explicitly through `start`/`run`.
    Manual,
    /// Started by the scheduler.
    Schedule {
        /// Five-field cron expression, evaluated in UTC.
        expression: String,
    },
    /// Started when the named application event is dispatched.
    Event {
        event: String,
    },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule { .. } => "schedule",
            Self::Event { .. } => "event",
        }
    }

    pub fn schedule_expression(&self) -> Option<&str> {
        match self {
            Self::Schedule { expression } => Some(expression),
            _ => None,
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { event } => Some(event),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionDefinition
// ---------------------------------------------------------------------------

/// A single step in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Unique within the workflow; referenced by `next_actions` and logs.
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Type-specific configuration handed to the handler.
    #[serde(default)]
    pub config: Value,
    /// Explicit successors. Empty means "the next action in the list".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
}

impl ActionDefinition {
    pub fn new(id: impl Into<String>, action_type: ActionType, config: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action_type,
            config,
            next_actions: Vec::new(),
        }
    }

    pub fn then(mut self, next: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.next_actions = next.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub actions: Vec<ActionDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, trigger: Trigger, actions: Vec<ActionDefinition>) -> Self {
        NewWorkflow::new(name, trigger, actions).into_definition(Utc::now())
    }

    /// Whether the scheduler should hold a timer for this definition.
    pub fn is_scheduled(&self) -> bool {
        self.enabled && matches!(self.trigger, Trigger::Schedule { .. })
    }
}

fn default_enabled() -> bool {
    true
}

/// Input for creating a definition. `id` is assigned when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

impl NewWorkflow {
    pub fn new(name: impl Into<String>, trigger: Trigger, actions: Vec<ActionDefinition>) -> Self {
        Self {
            id: None,
            name: name.into(),
            enabled: true,
            trigger,
            actions,
        }
    }

    /// Stamp id and timestamps.
    pub fn into_definition(self, now: DateTime<Utc>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name,
            enabled: self.enabled,
            trigger: self.trigger,
            actions: self.actions,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub actions: Option<Vec<ActionDefinition>>,
}

impl DefinitionPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// True when applying the patch may change the scheduler's view.
    pub fn touches_schedule(&self) -> bool {
        self.enabled.is_some() || self.trigger.is_some()
    }

    /// Merge into `definition` and bump `updated_at`.
    pub fn apply(self, definition: &mut WorkflowDefinition, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            definition.name = name;
        }
        if let Some(enabled) = self.enabled {
            definition.enabled = enabled;
        }
        if let Some(trigger) = self.trigger {
            definition.trigger = trigger;
        }
        if let Some(actions) = self.actions {
            definition.actions = actions;
        }
        definition.updated_at = now.max(definition.updated_at);
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
}

/// One entry in a run's log trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLog {
    pub timestamp: DateTime<Utc>,
    /// Action id, or [`SYSTEM_SOURCE`] for pipeline-level entries.
    pub action_id: String,
    pub status: LogStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WorkflowLog {
    pub fn is_system(&self) -> bool {
        self.action_id == SYSTEM_SOURCE
    }
}

/// One execution of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub logs: Vec<WorkflowLog>,
}

impl WorkflowRun {
    pub fn start(workflow_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Running,
            started_at: now,
            completed_at: None,
            error: None,
            logs: Vec::new(),
        }
    }

    /// Log entries written by actions (system entries excluded).
    pub fn action_logs(&self) -> impl Iterator<Item = &WorkflowLog> {
        self.logs.iter().filter(|log| !log.is_system())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trigger_serializes_with_type_tag() {
        let trigger = Trigger::Schedule {
            expression: "*/5 * * * *".into(),
        };
        assert_eq!(
            serde_json::to_value(&trigger).unwrap(),
            json!({ "type": "schedule", "expression": "*/5 * * * *" })
        );
        let manual: Trigger = serde_json::from_value(json!({ "type": "manual" })).unwrap();
        assert_eq!(manual, Trigger::Manual);
    }

    #[test]
    fn action_definition_reads_type_and_defaults() {
        let action: ActionDefinition =
            serde_json::from_value(json!({ "id": "w", "name": "Pause", "type": "wait" })).unwrap();
        assert_eq!(action.action_type, ActionType::Wait);
        assert_eq!(action.config, Value::Null);
        assert!(action.next_actions.is_empty());
    }

    #[test]
    fn new_workflow_keeps_supplied_id_and_defaults_enabled() {
        let id = Uuid::new_v4();
        let new: NewWorkflow = serde_json::from_value(json!({
            "id": id, "name": "n", "trigger": { "type": "manual" }
        }))
        .unwrap();
        let def = new.into_definition(Utc::now());
        assert_eq!(def.id, id);
        assert!(def.enabled);
        assert_eq!(def.created_at, def.updated_at);
    }

    #[test]
    fn patch_merges_and_bumps_updated_at() {
        let mut def = WorkflowDefinition::new("a", Trigger::Manual, vec![]);
        let before = def.updated_at;
        let later = before + chrono::Duration::seconds(5);

        let patch = DefinitionPatch {
            name: Some("b".into()),
            ..DefinitionPatch::default()
        };
        assert!(!patch.touches_schedule());
        patch.apply(&mut def, later);

        assert_eq!(def.name, "b");
        assert!(def.enabled);
        assert_eq!(def.updated_at, later);
        assert!(DefinitionPatch::enabled(false).touches_schedule());
    }
}
