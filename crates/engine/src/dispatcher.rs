//! Fan-out of application events to event-triggered workflows.

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::recorder::RunHandle;
use crate::{StoreError, WorkflowEngine};

#[derive(Clone)]
pub struct EventDispatcher {
    engine: WorkflowEngine,
}

impl EventDispatcher {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self { engine }
    }

    /// Start one run per enabled definition listening for `event_type`.
    ///
    /// Each run is started independently: a definition that fails to start
    /// is logged and skipped, and run failures never reach the caller.
    /// Only a failure to look up the matching definitions is returned.
    #[instrument(skip(self, payload))]
    pub async fn handle_event(&self, event_type: &str, payload: Value) -> Result<Vec<RunHandle>, StoreError> {
        let matching = self
            .engine
            .definitions()
            .list_enabled_by_trigger("event", Some(event_type))
            .await?;

        let mut started = Vec::with_capacity(matching.len());
        for definition in matching {
            let workflow_id = definition.id;
            match self.engine.start_definition(definition, payload.clone()).await {
                Ok(handle) => started.push(handle),
                Err(e) => warn!(%workflow_id, error = %e, "event-triggered workflow failed to start"),
            }
        }

        info!(runs = started.len(), "event dispatched");
        Ok(started)
    }
}
