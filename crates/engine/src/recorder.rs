//! Run recording: the single writer of a [`WorkflowRun`] while it executes.
//!
//! Every transition and log append is persisted through the [`RunStore`]
//! and published on a watch channel, so a [`RunHandle`] held by a
//! fire-and-forget caller always sees the latest state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use crate::models::{LogStatus, RunStatus, WorkflowLog, WorkflowRun, SYSTEM_SOURCE};
use crate::store::RunStore;
use crate::StoreError;

pub struct RunRecorder {
    run: WorkflowRun,
    store: Arc<dyn RunStore>,
    tx: watch::Sender<WorkflowRun>,
}

impl RunRecorder {
    /// Create and persist a new `running` record with an empty log.
    pub async fn begin(
        workflow_id: Uuid,
        store: Arc<dyn RunStore>,
    ) -> Result<(Self, RunHandle), StoreError> {
        let run = WorkflowRun::start(workflow_id, Utc::now());
        store.save(&run).await?;

        let (tx, rx) = watch::channel(run.clone());
        let handle = RunHandle {
            id: run.id,
            workflow_id,
            rx,
        };
        Ok((Self { run, store, tx }, handle))
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    /// Current time, clamped so log timestamps never go backwards.
    fn stamp(&self) -> DateTime<Utc> {
        let last = self
            .run
            .logs
            .last()
            .map_or(self.run.started_at, |log| log.timestamp);
        Utc::now().max(last)
    }

    fn push(&mut self, timestamp: DateTime<Utc>, source: &str, status: LogStatus, message: String, payload: Option<Value>) {
        self.run.logs.push(WorkflowLog {
            timestamp,
            action_id: source.to_owned(),
            status,
            message,
            payload,
        });
    }

    /// Persist and publish. A storage failure mid-run is logged, not fatal:
    /// the run still reaches a terminal state in memory.
    async fn flush(&self) {
        if let Err(e) = self.store.save(&self.run).await {
            warn!(run_id = %self.run.id, error = %e, "failed to persist run state");
        }
        self.tx.send_replace(self.run.clone());
    }

    pub async fn append(
        &mut self,
        source: &str,
        status: LogStatus,
        message: impl Into<String>,
        payload: Option<Value>,
    ) {
        let timestamp = self.stamp();
        self.push(timestamp, source, status, message.into(), payload);
        self.flush().await;
    }

    /// Transition to `completed`; the closing system log shares `completed_at`.
    pub async fn complete(mut self) -> WorkflowRun {
        let now = self.stamp();
        self.run.status = RunStatus::Completed;
        self.run.completed_at = Some(now);
        self.push(now, SYSTEM_SOURCE, LogStatus::Success, "Workflow completed".into(), None);
        self.flush().await;
        self.run
    }

    /// Transition to `failed` with `error` on the record and in the closing log.
    pub async fn fail(mut self, error: String) -> WorkflowRun {
        let now = self.stamp();
        self.run.status = RunStatus::Failed;
        self.run.completed_at = Some(now);
        self.push(now, SYSTEM_SOURCE, LogStatus::Error, format!("Workflow failed: {error}"), None);
        self.run.error = Some(error);
        self.flush().await;
        self.run
    }
}

/// Observer for a run started in the background.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: Uuid,
    pub workflow_id: Uuid,
    rx: watch::Receiver<WorkflowRun>,
}

impl RunHandle {
    /// The latest published state.
    pub fn snapshot(&self) -> WorkflowRun {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().status.is_terminal()
    }

    /// Wait for the run to reach a terminal state and return it.
    ///
    /// If the pipeline task goes away first, the last published state is returned.
    pub async fn wait(&self) -> WorkflowRun {
        let mut rx = self.rx.clone();
        let finished = rx
            .wait_for(|run| run.status.is_terminal())
            .await
            .map(|run| run.clone());
        finished.unwrap_or_else(|_| rx.borrow().clone())
    }
}
