//! Workflow execution engine.
//!
//! `WorkflowEngine` is the central orchestrator:
//! 1. Validates the action graph before any run record exists.
//! 2. Creates the run through a [`RunRecorder`] and logs a system start entry.
//! 3. Walks the actions strictly one at a time, dispatching each through the
//!    [`ActionRegistry`] and feeding every result into the run context.
//! 4. Stops at the first failure; otherwise completes the run.
//!
//! `start` and `run` share the same pipeline; `start` spawns it and hands
//! back a [`RunHandle`], `run` awaits it.

use std::sync::Arc;

use actions::{ActionRegistry, RunContext};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dag::{validate_action_graph, ActionWalk};
use crate::models::{LogStatus, WorkflowDefinition, WorkflowRun, SYSTEM_SOURCE};
use crate::recorder::{RunHandle, RunRecorder};
use crate::store::{DefinitionRegistry, RunStore};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// History length returned when the caller does not pass a limit.
    pub default_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_history_limit: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone shares the same registry and stores.
#[derive(Clone)]
pub struct WorkflowEngine {
    actions: Arc<ActionRegistry>,
    definitions: Arc<dyn DefinitionRegistry>,
    runs: Arc<dyn RunStore>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        actions: ActionRegistry,
        definitions: Arc<dyn DefinitionRegistry>,
        runs: Arc<dyn RunStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            actions: Arc::new(actions),
            definitions,
            runs,
            config,
        }
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionRegistry> {
        &self.definitions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn load(&self, workflow_id: Uuid) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .get(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))
    }

    /// Validate the graph and create the run record.
    async fn prepare(&self, definition: &WorkflowDefinition) -> Result<(RunRecorder, RunHandle), EngineError> {
        validate_action_graph(&definition.actions)?;
        Ok(RunRecorder::begin(definition.id, self.runs.clone()).await?)
    }

    /// Fire-and-forget: start the stored workflow and return immediately.
    pub async fn start(&self, workflow_id: Uuid, input: Value) -> Result<RunHandle, EngineError> {
        let definition = self.load(workflow_id).await?;
        self.start_definition(definition, input).await
    }

    pub async fn start_definition(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<RunHandle, EngineError> {
        let (recorder, handle) = self.prepare(&definition).await?;
        let engine = self.clone();
        tokio::spawn(async move {
            engine.execute_pipeline(definition, recorder, input).await;
        });
        Ok(handle)
    }

    /// Synchronous: run the stored workflow to a terminal state.
    ///
    /// A failed run is still `Ok`; `Err` means no run could be started.
    pub async fn run(&self, workflow_id: Uuid, input: Value) -> Result<WorkflowRun, EngineError> {
        let definition = self.load(workflow_id).await?;
        self.run_definition(definition, input).await
    }

    pub async fn run_definition(
        &self,
        definition: WorkflowDefinition,
        input: Value,
    ) -> Result<WorkflowRun, EngineError> {
        let (recorder, _handle) = self.prepare(&definition).await?;
        Ok(self.execute_pipeline(definition, recorder, input).await)
    }

    pub async fn list_running_runs(&self) -> Result<Vec<WorkflowRun>, EngineError> {
        Ok(self.runs.list_running().await?)
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<WorkflowRun, EngineError> {
        self.runs
            .get(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Most recent runs first; empty when the workflow never ran.
    pub async fn get_run_history(
        &self,
        workflow_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<WorkflowRun>, EngineError> {
        let limit = limit.unwrap_or(self.config.default_history_limit);
        Ok(self.runs.history(workflow_id, limit).await?)
    }

    #[instrument(skip_all, fields(workflow_id = %definition.id, run_id = %recorder.run_id()))]
    async fn execute_pipeline(
        &self,
        definition: WorkflowDefinition,
        mut recorder: RunRecorder,
        input: Value,
    ) -> WorkflowRun {
        let trigger = if input.is_null() {
            Value::Object(Default::default())
        } else {
            input
        };

        info!(actions = definition.actions.len(), "workflow run started");
        recorder
            .append(
                SYSTEM_SOURCE,
                LogStatus::Success,
                format!("Workflow '{}' started", definition.name),
                None,
            )
            .await;

        let mut ctx = RunContext::new(definition.id, definition.name.clone(), recorder.run_id(), trigger);
        let mut walk = ActionWalk::new(&definition.actions);

        while let Some((index, action)) = walk.next_action() {
            debug!(action_id = %action.id, action_type = %action.action_type, "executing action");

            match self.actions.execute(action.action_type, &action.config, &ctx).await {
                Ok(output) => {
                    recorder
                        .append(
                            &action.id,
                            LogStatus::Success,
                            format!("Action '{}' completed", action.name),
                            Some(output.clone()),
                        )
                        .await;
                    ctx.record_output(&action.id, output);
                    walk.advance(index);
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(action_id = %action.id, error = %message, "action failed, aborting run");
                    recorder.append(&action.id, LogStatus::Error, message.clone(), None).await;
                    return recorder.fail(message).await;
                }
            }
        }

        let run = recorder.complete().await;
        info!("workflow run completed");
        run
    }
}
