//! Test doubles for handlers and collaborators.
//!
//! Useful in unit and integration tests where real delivery is either
//! unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    ActionError, ActionHandler, ActionType, Collaborators, EmailMessage, EmailSender, HttpClient,
    HttpRequest, HttpResponse, NewTask, Notification, NotificationSender, RunContext, TaskCreator,
};

/// A context with fresh ids and an empty trigger payload.
pub fn test_context() -> RunContext {
    RunContext::new(Uuid::new_v4(), "test", Uuid::new_v4(), Value::Object(Default::default()))
}

/// Recording senders and task creator, and an HTTP client with no
/// scripted routes (every request is a transport error).
pub fn test_collaborators() -> Collaborators {
    Collaborators {
        notifications: Arc::new(RecordingNotificationSender::default()),
        email: Arc::new(RecordingEmailSender::default()),
        tasks: Arc::new(RecordingTaskCreator::default()),
        http: Arc::new(ScriptedHttpClient::default()),
    }
}

// ---------------------------------------------------------------------------
// MockHandler
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockHandler` at construction time.
pub enum MockBehaviour {
    ReturnValue(Value),
    Fail(ActionError),
}

/// A handler that records every config it receives and returns a
/// programmer-specified result.
pub struct MockHandler {
    pub action_type: ActionType,
    pub behaviour: MockBehaviour,
    /// All configs seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockHandler {
    pub fn returning(action_type: ActionType, value: Value) -> Self {
        Self {
            action_type,
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(action_type: ActionType, error: ActionError) -> Self {
        Self {
            action_type,
            behaviour: MockBehaviour::Fail(error),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionHandler for MockHandler {
    fn action_type(&self) -> ActionType {
        self.action_type
    }

    async fn execute(&self, config: &Value, _ctx: &RunContext) -> Result<Value, ActionError> {
        self.calls.lock().unwrap().push(config.clone());
        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::Fail(e) => Err(e.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<Notification>>,
    reject_with: Option<String>,
}

impl RecordingNotificationSender {
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::default(),
            reject_with: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        if let Some(reason) = &self.reject_with {
            anyhow::bail!("{reason}");
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    reject_with: Option<String>,
}

impl RecordingEmailSender {
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::default(),
            reject_with: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: &EmailMessage) -> anyhow::Result<()> {
        if let Some(reason) = &self.reject_with {
            anyhow::bail!("{reason}");
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Keeps every created task alongside the id it was given.
#[derive(Default)]
pub struct RecordingTaskCreator {
    created: Mutex<Vec<(String, NewTask)>>,
}

impl RecordingTaskCreator {
    pub fn created(&self) -> Vec<(String, NewTask)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskCreator for RecordingTaskCreator {
    async fn create(&self, task: &NewTask) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.created.lock().unwrap().push((id.clone(), task.clone()));
        Ok(id)
    }
}

/// Answers requests from a fixed url → response table. Unknown urls fail
/// like an unresolvable host.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: HashMap<String, HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn respond(mut self, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(
            url.into(),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.routes
            .get(&url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("error sending request for url ({url}): dns error"))
    }
}
