//! Definition management with scheduler synchronisation.
//!
//! The registry holds no timer state, so every write that can change a
//! workflow's schedule goes through here and is followed by the matching
//! scheduler call. Writes to the same workflow are serialised so the
//! persisted definition and its timer always agree.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::dag::validate_definition;
use crate::models::{DefinitionPatch, NewWorkflow, WorkflowDefinition};
use crate::scheduler::Scheduler;
use crate::{EngineError, StoreError, WorkflowEngine};

#[derive(Clone)]
pub struct WorkflowService {
    engine: WorkflowEngine,
    scheduler: Arc<Scheduler>,
    /// Held across persist + scheduler sync for one workflow id.
    write_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl WorkflowService {
    pub fn new(engine: WorkflowEngine, scheduler: Arc<Scheduler>) -> Self {
        Self {
            engine,
            scheduler,
            write_locks: Arc::default(),
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn create(&self, new: NewWorkflow) -> Result<WorkflowDefinition, EngineError> {
        let now = Utc::now();
        let definition = new.into_definition(now);
        validate_definition(&definition, now)?;

        let id = definition.id;
        let guard = self.lock_workflow(id).await;
        let result = self.create_locked(definition).await;
        drop(guard);
        if result.is_err() {
            self.forget_lock(id).await;
        }
        result
    }

    async fn create_locked(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError> {
        let saved = self.engine.definitions().create(definition).await?;
        self.scheduler.reconcile(&saved).await?;
        info!(workflow_id = %saved.id, trigger = saved.trigger.kind(), "workflow created");
        Ok(saved)
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, EngineError> {
        self.engine
            .definitions()
            .get(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        Ok(self.engine.definitions().list().await?)
    }

    /// Merge `patch`, validate the result, persist it, and resynchronise the
    /// scheduler when `enabled` or the trigger changed.
    pub async fn update(&self, id: Uuid, patch: DefinitionPatch) -> Result<WorkflowDefinition, EngineError> {
        let guard = self.lock_workflow(id).await;
        let result = self.update_locked(id, patch).await;
        drop(guard);
        if matches!(result, Err(EngineError::WorkflowNotFound(_))) {
            self.forget_lock(id).await;
        }
        result
    }

    async fn update_locked(&self, id: Uuid, patch: DefinitionPatch) -> Result<WorkflowDefinition, EngineError> {
        let mut definition = self.get(id).await?;
        let touches_schedule = patch.touches_schedule();

        let now = Utc::now();
        patch.apply(&mut definition, now);
        validate_definition(&definition, now)?;

        let saved = match self.engine.definitions().update(definition).await {
            Ok(saved) => saved,
            Err(StoreError::NotFound) => return Err(EngineError::WorkflowNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        if touches_schedule {
            self.scheduler.reconcile(&saved).await?;
        }
        info!(workflow_id = %id, "workflow updated");
        Ok(saved)
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<WorkflowDefinition, EngineError> {
        self.update(id, DefinitionPatch::enabled(enabled)).await
    }

    /// Delete the definition and cancel its timer. Runs already started continue.
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        let guard = self.lock_workflow(id).await;
        let deleted = self.engine.definitions().delete(id).await;
        self.scheduler.unregister(id).await;
        drop(guard);
        self.forget_lock(id).await;

        if !deleted? {
            return Err(EngineError::WorkflowNotFound(id));
        }
        info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    /// Rebuild scheduler timers from the registry. Call once at startup.
    pub async fn bootstrap(&self) -> Result<usize, EngineError> {
        Ok(self.scheduler.bootstrap().await?)
    }

    async fn lock_workflow(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self.write_locks.lock().await.entry(id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry for `id` unless another writer holds or awaits it.
    async fn forget_lock(&self, id: Uuid) {
        let mut locks = self.write_locks.lock().await;
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ActionDefinition, Trigger};
    use crate::store::{DefinitionRegistry, InMemoryDefinitionRegistry, InMemoryRunStore};
    use crate::{DefinitionError, EngineConfig};
    use actions::{ActionRegistry, ActionType};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde_json::Value;

    fn service_with(definitions: Arc<dyn DefinitionRegistry>, clock: Arc<ManualClock>) -> WorkflowService {
        let engine = WorkflowEngine::new(
            ActionRegistry::new(),
            definitions,
            Arc::new(InMemoryRunStore::new()),
            EngineConfig::default(),
        );
        let scheduler = Arc::new(Scheduler::new(engine.clone(), clock));
        WorkflowService::new(engine, scheduler)
    }

    fn service() -> WorkflowService {
        service_with(
            Arc::new(InMemoryDefinitionRegistry::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn schedule_patch(expression: &str) -> DefinitionPatch {
        DefinitionPatch {
            trigger: Some(Trigger::Schedule { expression: expression.into() }),
            ..DefinitionPatch::default()
        }
    }

    /// Pauses after persisting a definition with the `stall_on` schedule,
    /// widening the gap between saving and the scheduler sync.
    struct StallingRegistry {
        inner: InMemoryDefinitionRegistry,
        stall_on: &'static str,
    }

    #[async_trait]
    impl DefinitionRegistry for StallingRegistry {
        async fn create(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
            self.inner.create(definition).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<WorkflowDefinition>, StoreError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
            self.inner.list().await
        }

        async fn update(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition, StoreError> {
            let saved = self.inner.update(definition).await?;
            if saved.trigger.schedule_expression() == Some(self.stall_on) {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            Ok(saved)
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }

        async fn list_enabled_by_trigger(
            &self,
            kind: &str,
            event: Option<&str>,
        ) -> Result<Vec<WorkflowDefinition>, StoreError> {
            self.inner.list_enabled_by_trigger(kind, event).await
        }
    }

    fn scheduled(expression: &str) -> NewWorkflow {
        NewWorkflow::new(
            "nightly report",
            Trigger::Schedule { expression: expression.into() },
            vec![ActionDefinition::new("w", ActionType::Wait, Value::Null)],
        )
    }

    #[tokio::test]
    async fn create_registers_schedule() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();
        assert!(svc.scheduler().is_registered(def.id).await);
        assert_eq!(svc.get(def.id).await.unwrap(), def);
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected_and_not_stored() {
        let svc = service();
        let err = svc.create(scheduled("99 * * * *")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Definition(DefinitionError::InvalidSchedule { .. })
        ));
        assert!(svc.list().await.unwrap().is_empty());
        assert_eq!(svc.scheduler().active_count().await, 0);
    }

    #[tokio::test]
    async fn update_expression_keeps_exactly_one_timer() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        let updated = svc.update(def.id, schedule_patch("*/10 * * * *")).await.unwrap();

        assert_eq!(updated.trigger.schedule_expression(), Some("*/10 * * * *"));
        assert!(updated.updated_at >= def.updated_at);
        assert_eq!(svc.scheduler().active_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_updates_leave_the_timer_on_the_stored_schedule() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap()));
        let registry = StallingRegistry {
            inner: InMemoryDefinitionRegistry::new(),
            stall_on: "* * * * *",
        };
        let svc = service_with(Arc::new(registry), clock.clone());
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        let every_minute = {
            let (svc, id) = (svc.clone(), def.id);
            tokio::spawn(async move { svc.update(id, schedule_patch("* * * * *")).await })
        };
        // Let the first update persist and stall before the second one starts.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        svc.update(def.id, schedule_patch("0 3 * * *")).await.unwrap();
        every_minute.await.unwrap().unwrap();

        let stored = svc.get(def.id).await.unwrap();
        assert_eq!(stored.trigger.schedule_expression(), Some("0 3 * * *"));
        assert_eq!(svc.scheduler().active_count().await, 1);

        clock.advance(Duration::minutes(1));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(svc.engine().get_run_history(def.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_during_update_leaves_no_timer() {
        let registry = StallingRegistry {
            inner: InMemoryDefinitionRegistry::new(),
            stall_on: "* * * * *",
        };
        let svc = service_with(Arc::new(registry), Arc::new(ManualClock::new(Utc::now())));
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        let update = {
            let (svc, id) = (svc.clone(), def.id);
            tokio::spawn(async move { svc.update(id, schedule_patch("* * * * *")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        svc.delete(def.id).await.unwrap();
        update.await.unwrap().unwrap();

        assert!(!svc.scheduler().is_registered(def.id).await);
        assert_eq!(svc.scheduler().active_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_update_leaves_stored_definition_untouched() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        let patch = DefinitionPatch {
            trigger: Some(Trigger::Schedule { expression: "nonsense".into() }),
            ..DefinitionPatch::default()
        };
        assert!(svc.update(def.id, patch).await.is_err());
        assert_eq!(svc.get(def.id).await.unwrap(), def);
        assert!(svc.scheduler().is_registered(def.id).await);
    }

    #[tokio::test]
    async fn disable_and_enable_toggle_the_timer() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        assert!(!svc.set_enabled(def.id, false).await.unwrap().enabled);
        assert!(!svc.scheduler().is_registered(def.id).await);

        svc.set_enabled(def.id, true).await.unwrap();
        assert!(svc.scheduler().is_registered(def.id).await);
    }

    #[tokio::test]
    async fn switching_to_manual_trigger_drops_the_timer() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        let patch = DefinitionPatch {
            trigger: Some(Trigger::Manual),
            ..DefinitionPatch::default()
        };
        svc.update(def.id, patch).await.unwrap();
        assert_eq!(svc.scheduler().active_count().await, 0);
    }

    #[tokio::test]
    async fn delete_cancels_timer_and_reports_missing() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();

        svc.delete(def.id).await.unwrap();
        assert!(!svc.scheduler().is_registered(def.id).await);
        assert!(matches!(svc.get(def.id).await, Err(EngineError::WorkflowNotFound(_))));
        assert!(matches!(svc.delete(def.id).await, Err(EngineError::WorkflowNotFound(_))));
    }

    #[tokio::test]
    async fn graph_errors_are_rejected_on_create() {
        let svc = service();
        let new = NewWorkflow::new(
            "loop",
            Trigger::Manual,
            vec![
                ActionDefinition::new("a", ActionType::Wait, Value::Null).then(["b"]),
                ActionDefinition::new("b", ActionType::Wait, Value::Null).then(["a"]),
            ],
        );
        assert!(matches!(
            svc.create(new).await,
            Err(EngineError::Definition(DefinitionError::CycleDetected))
        ));
    }

    #[tokio::test]
    async fn bootstrap_restores_timers_after_restart() {
        let svc = service();
        let def = svc.create(scheduled("0 2 * * *")).await.unwrap();
        svc.scheduler().shutdown().await;

        assert_eq!(svc.bootstrap().await.unwrap(), 1);
        assert!(svc.scheduler().is_registered(def.id).await);
    }
}
