//! Storage seams for definitions and runs.
//!
//! The engine, scheduler and dispatcher only see these traits. The in-memory
//! implementations back tests and database-less deployments; the Postgres
//! ones live in [`crate::postgres`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{RunStatus, WorkflowDefinition, WorkflowRun};
use crate::StoreError;

/// Authoritative store of workflow definitions.
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
    /// Insert a new definition. Fails with [`StoreError::Conflict`] if the id is taken.
    async fn create(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError>;

    /// All definitions, newest first.
    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;

    /// Replace an existing definition. Fails with [`StoreError::NotFound`] if absent.
    async fn update(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Enabled definitions whose trigger is of `kind` (and, for events, names
    /// `event`), oldest first.
    async fn list_enabled_by_trigger(
        &self,
        kind: &str,
        event: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, StoreError>;
}

/// Durable record of runs and their log trails.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or overwrite the run with the same id.
    async fn save(&self, run: &WorkflowRun) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, StoreError>;

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StoreError>;

    /// Up to `limit` runs of `workflow_id`, newest first.
    async fn history(&self, workflow_id: Uuid, limit: usize) -> Result<Vec<WorkflowRun>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDefinitionRegistry {
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
}

impl InMemoryDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_created_at(mut definitions: Vec<WorkflowDefinition>, newest_first: bool) -> Vec<WorkflowDefinition> {
    definitions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    if newest_first {
        definitions.reverse();
    }
    definitions
}

#[async_trait]
impl DefinitionRegistry for InMemoryDefinitionRegistry {
    async fn create(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.id) {
            return Err(StoreError::Conflict(definition.id));
        }
        definitions.insert(definition.id, definition.clone());
        Ok(definition)
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self.definitions.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let all = self.definitions.read().await.values().cloned().collect();
        Ok(by_created_at(all, true))
    }

    async fn update(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
        let mut definitions = self.definitions.write().await;
        match definitions.get_mut(&definition.id) {
            Some(slot) => {
                *slot = definition.clone();
                Ok(definition)
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.definitions.write().await.remove(&id).is_some())
    }

    async fn list_enabled_by_trigger(
        &self,
        kind: &str,
        event: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let matching = self
            .definitions
            .read()
            .await
            .values()
            .filter(|d| d.enabled && d.trigger.kind() == kind)
            .filter(|d| event.is_none() || d.trigger.event_name() == event)
            .cloned()
            .collect();
        Ok(by_created_at(matching, false))
    }
}

#[derive(Default)]
struct RunTable {
    /// Run plus its insertion sequence, used to order runs that share a start time.
    runs: HashMap<Uuid, (u64, WorkflowRun)>,
    next_seq: u64,
}

#[derive(Default)]
pub struct InMemoryRunStore {
    table: RwLock<RunTable>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &WorkflowRun) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let seq = match table.runs.get(&run.id) {
            Some((seq, _)) => *seq,
            None => {
                table.next_seq += 1;
                table.next_seq
            }
        };
        table.runs.insert(run.id, (seq, run.clone()));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        Ok(self.table.read().await.runs.get(&id).map(|(_, run)| run.clone()))
    }

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StoreError> {
        let table = self.table.read().await;
        let mut running: Vec<_> = table
            .runs
            .values()
            .filter(|(_, run)| run.status == RunStatus::Running)
            .collect();
        running.sort_by_key(|(seq, run)| (run.started_at, *seq));
        Ok(running.into_iter().map(|(_, run)| run.clone()).collect())
    }

    async fn history(&self, workflow_id: Uuid, limit: usize) -> Result<Vec<WorkflowRun>, StoreError> {
        let table = self.table.read().await;
        let mut runs: Vec<_> = table
            .runs
            .values()
            .filter(|(_, run)| run.workflow_id == workflow_id)
            .collect();
        runs.sort_by(|(sa, a), (sb, b)| b.started_at.cmp(&a.started_at).then(sb.cmp(sa)));
        Ok(runs.into_iter().take(limit).map(|(_, run)| run.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionDefinition, Trigger};
    use chrono::{Duration, Utc};

    fn event_workflow(name: &str, event: &str, enabled: bool) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new(
            name,
            Trigger::Event { event: event.into() },
            Vec::<ActionDefinition>::new(),
        );
        def.enabled = enabled;
        def
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let registry = InMemoryDefinitionRegistry::new();
        let def = event_workflow("a", "user.created", true);
        registry.create(def.clone()).await.unwrap();
        assert!(matches!(registry.create(def.clone()).await, Err(StoreError::Conflict(id)) if id == def.id));
    }

    #[tokio::test]
    async fn update_requires_existing_definition() {
        let registry = InMemoryDefinitionRegistry::new();
        let def = event_workflow("a", "user.created", true);
        assert!(matches!(registry.update(def).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn enabled_by_trigger_filters_on_event_and_enabled() {
        let registry = InMemoryDefinitionRegistry::new();
        let on = registry.create(event_workflow("on", "user.created", true)).await.unwrap();
        registry.create(event_workflow("off", "user.created", false)).await.unwrap();
        registry.create(event_workflow("other", "user.deleted", true)).await.unwrap();
        registry
            .create(WorkflowDefinition::new("manual", Trigger::Manual, vec![]))
            .await
            .unwrap();

        let matched = registry.list_enabled_by_trigger("event", Some("user.created")).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, on.id);
        assert_eq!(registry.list_enabled_by_trigger("event", None).await.unwrap().len(), 2);
        assert!(registry.delete(on.id).await.unwrap());
        assert!(!registry.delete(on.id).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = InMemoryRunStore::new();
        let workflow_id = Uuid::new_v4();
        let base = Utc::now();

        let mut ids = Vec::new();
        for i in 0..3 {
            let run = WorkflowRun::start(workflow_id, base + Duration::seconds(i));
            ids.push(run.id);
            store.save(&run).await.unwrap();
        }
        // Same start time as the last one; insertion order breaks the tie.
        let tied = WorkflowRun::start(workflow_id, base + Duration::seconds(2));
        store.save(&tied).await.unwrap();
        store.save(&WorkflowRun::start(Uuid::new_v4(), base)).await.unwrap();

        let history = store.history(workflow_id, 3).await.unwrap();
        let got: Vec<Uuid> = history.iter().map(|r| r.id).collect();
        assert_eq!(got, vec![tied.id, ids[2], ids[1]]);
        assert!(store.history(Uuid::new_v4(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_overwrites_and_running_excludes_finished() {
        let store = InMemoryRunStore::new();
        let mut run = WorkflowRun::start(Uuid::new_v4(), Utc::now());
        store.save(&run).await.unwrap();
        assert_eq!(store.list_running().await.unwrap().len(), 1);

        run.status = RunStatus::Completed;
        store.save(&run).await.unwrap();
        assert!(store.list_running().await.unwrap().is_empty());
        assert_eq!(store.get(run.id).await.unwrap().unwrap().status, RunStatus::Completed);
    }
}
