//! The `ActionHandler` trait — the contract every action type must fulfil.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{ActionError, ActionType};

/// Shared context passed to every handler during a run.
///
/// Defined here (in the actions crate) so both the engine and individual
/// handlers can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub run_id: Uuid,
    /// Payload the run was started with (event payload, manual input, ...).
    pub trigger: Value,
    /// Results of the actions that already succeeded in this run, keyed by action id.
    pub outputs: Map<String, Value>,
}

impl RunContext {
    pub fn new(workflow_id: Uuid, workflow_name: impl Into<String>, run_id: Uuid, trigger: Value) -> Self {
        Self {
            workflow_id,
            workflow_name: workflow_name.into(),
            run_id,
            trigger,
            outputs: Map::new(),
        }
    }

    /// Record a successful action's result so later conditions can read it.
    pub fn record_output(&mut self, action_id: &str, output: Value) {
        self.outputs.insert(action_id.to_owned(), output);
    }

    /// The context as the JSON map condition fields are resolved against.
    pub fn as_value(&self) -> Value {
        json!({
            "workflow": { "id": self.workflow_id, "name": self.workflow_name },
            "run": { "id": self.run_id },
            "trigger": self.trigger,
            "actions": self.outputs,
        })
    }

    /// Resolve a dot path such as `trigger.order.total` or `actions.fetch.body.0`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let root = self.as_value();
        let mut current = &root;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

/// The core handler trait.
///
/// A handler validates its own config and fails with
/// [`ActionError::Config`] before attempting any side effect.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The action type this handler serves.
    fn action_type(&self) -> ActionType;

    /// Execute the action and return its structured result.
    async fn execute(&self, config: &Value, ctx: &RunContext) -> Result<Value, ActionError>;
}
