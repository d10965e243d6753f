use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_config, require_non_empty, OneOrMany};
use crate::{ActionError, ActionHandler, ActionType, Notification, NotificationSender, RunContext};

#[derive(Debug, Deserialize)]
struct NotificationConfig {
    message: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    recipients: Option<OneOrMany>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    level: Option<String>,
}

pub struct NotificationHandler {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationHandler {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ActionHandler for NotificationHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Notification
    }

    async fn execute(&self, config: &Value, ctx: &RunContext) -> Result<Value, ActionError> {
        let cfg: NotificationConfig = parse_config(ActionType::Notification, config)?;
        require_non_empty(ActionType::Notification, "message", &cfg.message)?;

        let mut recipients = cfg.recipients.map(OneOrMany::into_vec).unwrap_or_default();
        if let Some(single) = cfg.recipient.map(|r| r.trim().to_owned()) {
            if !single.is_empty() && !recipients.contains(&single) {
                recipients.insert(0, single);
            }
        }
        if recipients.is_empty() {
            return Err(ActionError::config(
                ActionType::Notification,
                "at least one recipient is required",
            ));
        }

        let notification = Notification {
            recipients,
            title: cfg.title,
            message: cfg.message,
            level: cfg.level.unwrap_or_else(|| "info".into()),
        };

        debug!(run_id = %ctx.run_id, "sending notification to {:?}", notification.recipients);
        self.sender
            .send(&notification)
            .await
            .map_err(|e| ActionError::Execution(format!("Notification failed: {e}")))?;

        Ok(json!({
            "recipients": notification.recipients,
            "message": notification.message,
        }))
    }
}
