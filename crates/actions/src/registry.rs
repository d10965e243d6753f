//! Maps each [`ActionType`] to the handler that executes it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::handlers::{
    ConditionHandler, EmailHandler, NotificationHandler, TaskHandler, WaitHandler, WebhookHandler,
};
use crate::{ActionError, ActionHandler, ActionType, Collaborators, RunContext};

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// An empty registry. Every lookup fails until handlers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// All six built-in handlers wired to the given collaborators.
    pub fn builtin(collaborators: Collaborators) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NotificationHandler::new(collaborators.notifications)));
        registry.register(Arc::new(EmailHandler::new(collaborators.email)));
        registry.register(Arc::new(TaskHandler::new(collaborators.tasks)));
        registry.register(Arc::new(WebhookHandler::new(collaborators.http)));
        registry.register(Arc::new(ConditionHandler));
        registry.register(Arc::new(WaitHandler));
        registry
    }

    /// Register (or replace) the handler for its action type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(handler.action_type(), handler);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    /// Dispatch to the registered handler.
    pub async fn execute(
        &self,
        action_type: ActionType,
        config: &Value,
        ctx: &RunContext,
    ) -> Result<Value, ActionError> {
        let handler = self
            .get(action_type)
            .ok_or(ActionError::Unsupported(action_type))?;
        handler.execute(config, ctx).await
    }
}
