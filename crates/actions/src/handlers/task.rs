use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_config, require_non_empty};
use crate::{ActionError, ActionHandler, ActionType, NewTask, RunContext, TaskCreator, TaskPriority};

#[derive(Debug, Deserialize)]
struct TaskConfig {
    title: String,
    description: String,
    assignee: String,
    #[serde(default)]
    priority: TaskPriority,
    #[serde(default)]
    due_date: Option<String>,
}

pub struct TaskHandler {
    creator: Arc<dyn TaskCreator>,
}

impl TaskHandler {
    pub fn new(creator: Arc<dyn TaskCreator>) -> Self {
        Self { creator }
    }
}

#[async_trait]
impl ActionHandler for TaskHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Task
    }

    async fn execute(&self, config: &Value, _ctx: &RunContext) -> Result<Value, ActionError> {
        let cfg: TaskConfig = parse_config(ActionType::Task, config)?;
        require_non_empty(ActionType::Task, "title", &cfg.title)?;
        require_non_empty(ActionType::Task, "assignee", &cfg.assignee)?;

        let task = NewTask {
            title: cfg.title,
            description: cfg.description,
            assignee: cfg.assignee,
            priority: cfg.priority,
            due_date: cfg.due_date,
        };

        let task_id = self
            .creator
            .create(&task)
            .await
            .map_err(|e| ActionError::Execution(format!("Task creation failed: {e}")))?;

        Ok(json!({ "task_id": task_id, "title": task.title }))
    }
}
