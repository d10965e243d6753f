use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_config, require_non_empty};
use crate::{ActionError, ActionHandler, ActionType, HttpClient, HttpRequest, RunContext};

const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

pub struct WebhookHandler {
    client: Arc<dyn HttpClient>,
}

impl WebhookHandler {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Webhook
    }

    async fn execute(&self, config: &Value, ctx: &RunContext) -> Result<Value, ActionError> {
        let cfg: WebhookConfig = parse_config(ActionType::Webhook, config)?;
        require_non_empty(ActionType::Webhook, "url", &cfg.url)?;
        if !(cfg.url.starts_with("http://") || cfg.url.starts_with("https://")) {
            return Err(ActionError::config(
                ActionType::Webhook,
                format!("'{}' is not an http(s) url", cfg.url),
            ));
        }

        let method = cfg.method.as_deref().unwrap_or("POST").to_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(ActionError::config(
                ActionType::Webhook,
                format!("unsupported method '{method}'"),
            ));
        }

        debug!(run_id = %ctx.run_id, "calling webhook {} {}", method, cfg.url);
        let response = self
            .client
            .send(HttpRequest {
                method,
                url: cfg.url,
                headers: cfg.headers,
                body: cfg.body,
            })
            .await
            .map_err(|e| ActionError::Execution(format!("Webhook failed: {e}")))?;

        if !response.is_success() {
            return Err(ActionError::Execution(format!("HTTP {}", response.status)));
        }

        let body = serde_json::from_str::<Value>(&response.body)
            .unwrap_or(Value::String(response.body));
        Ok(json!({ "status": response.status, "body": body }))
    }
}
