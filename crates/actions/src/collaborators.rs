//! Side-effect collaborators the built-in handlers call.
//!
//! The engine only defines these contracts. The implementations here are the
//! defaults the binary wires up: tracing-backed senders and task creator, and
//! a reqwest HTTP client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub title: Option<String>,
    pub message: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub from: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assignee: String,
    pub priority: TaskPriority,
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TaskCreator: Send + Sync {
    /// Create the task and return its generated id.
    async fn create(&self, task: &NewTask) -> anyhow::Result<String>;
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request. Non-2xx statuses are returned, not raised;
    /// only transport failures are errors.
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;
}

/// The full set of collaborators the built-in handlers need.
#[derive(Clone)]
pub struct Collaborators {
    pub notifications: Arc<dyn NotificationSender>,
    pub email: Arc<dyn EmailSender>,
    pub tasks: Arc<dyn TaskCreator>,
    pub http: Arc<dyn HttpClient>,
}

impl Collaborators {
    /// Log-only senders and task creator, and a real HTTP client.
    pub fn defaults(http_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            notifications: Arc::new(LogNotificationSender),
            email: Arc::new(LogEmailSender),
            tasks: Arc::new(LogTaskCreator),
            http: Arc::new(ReqwestHttpClient::new(http_timeout)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Default implementations
// ---------------------------------------------------------------------------

/// Writes notifications to the log instead of delivering them.
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            recipients = ?notification.recipients,
            level = %notification.level,
            "notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// Writes emails to the log instead of delivering them.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &EmailMessage) -> anyhow::Result<()> {
        info!(to = ?email.to, cc = ?email.cc, "email: {}", email.subject);
        Ok(())
    }
}

/// Assigns a fresh id and logs the task. Nothing is retained.
pub struct LogTaskCreator;

#[async_trait]
impl TaskCreator for LogTaskCreator {
    async fn create(&self, task: &NewTask) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        info!(
            task_id = %id,
            assignee = %task.assignee,
            priority = ?task.priority,
            "task created: {}",
            task.title
        );
        Ok(id)
    }
}

/// reqwest-backed [`HttpClient`].
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rusty-workflows/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("invalid method '{}'", request.method))?;

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(Value::String(text)) => builder.body(text),
            Some(body) => builder.json(&body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_task_creator_assigns_fresh_ids() {
        let task = NewTask {
            title: "Rotate keys".into(),
            description: "quarterly".into(),
            assignee: "ops".into(),
            priority: TaskPriority::default(),
            due_date: None,
        };
        let first = LogTaskCreator.create(&task).await.unwrap();
        let second = LogTaskCreator.create(&task).await.unwrap();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
