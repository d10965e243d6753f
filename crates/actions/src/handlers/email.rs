use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_config, require_non_empty, OneOrMany};
use crate::{ActionError, ActionHandler, ActionType, EmailMessage, EmailSender, RunContext};

#[derive(Debug, Deserialize)]
struct EmailConfig {
    to: OneOrMany,
    subject: String,
    body: String,
    #[serde(default)]
    cc: Option<OneOrMany>,
    #[serde(default)]
    from: Option<String>,
}

pub struct EmailHandler {
    sender: Arc<dyn EmailSender>,
}

impl EmailHandler {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ActionHandler for EmailHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Email
    }

    async fn execute(&self, config: &Value, _ctx: &RunContext) -> Result<Value, ActionError> {
        let cfg: EmailConfig = parse_config(ActionType::Email, config)?;
        let to = cfg.to.into_vec();
        if to.is_empty() {
            return Err(ActionError::config(ActionType::Email, "'to' must not be empty"));
        }
        if let Some(bad) = to.iter().find(|addr| !addr.contains('@')) {
            return Err(ActionError::config(
                ActionType::Email,
                format!("'{bad}' is not an email address"),
            ));
        }
        require_non_empty(ActionType::Email, "subject", &cfg.subject)?;

        let email = EmailMessage {
            to,
            cc: cfg.cc.map(OneOrMany::into_vec).unwrap_or_default(),
            from: cfg.from,
            subject: cfg.subject,
            body: cfg.body,
        };

        self.sender
            .send(&email)
            .await
            .map_err(|e| ActionError::Execution(format!("Email failed: {e}")))?;

        Ok(json!({ "to": email.to, "subject": email.subject }))
    }
}
