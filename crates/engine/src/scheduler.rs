//! Recurring firings for schedule-triggered workflows.
//!
//! One tokio task per registered workflow sleeps on the [`Clock`] until the
//! next matching minute, starts a run without waiting for it, and computes
//! the following deadline. Timers live only in this process; `bootstrap`
//! rebuilds them from the definition registry on startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dag::validate_trigger;
use crate::models::WorkflowDefinition;
use crate::schedule::{CronSchedule, ScheduleError};
use crate::{DefinitionError, StoreError, WorkflowEngine};

/// A running timer task. Dropping it cancels the task.
struct ActiveTimer {
    expression: String,
    task: JoinHandle<()>,
}

impl Drop for ActiveTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Scheduler {
    engine: WorkflowEngine,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<Uuid, ActiveTimer>>,
}

impl Scheduler {
    pub fn new(engine: WorkflowEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Validate the schedule and, if the definition is enabled and
    /// schedule-triggered, install its timer (replacing any existing one).
    ///
    /// Returns whether a timer is now active for the definition.
    pub async fn register(&self, definition: &WorkflowDefinition) -> Result<bool, DefinitionError> {
        let now = self.clock.now();
        let Some(schedule) = validate_trigger(&definition.trigger, now)? else {
            return Ok(false);
        };
        if !definition.enabled {
            return Ok(false);
        }

        let first = schedule.next_after(now).ok_or_else(|| DefinitionError::InvalidSchedule {
            expression: schedule.expression().to_owned(),
            source: ScheduleError::NeverFires,
        })?;

        let expression = schedule.expression().to_owned();
        let task = tokio::spawn(run_timer(
            self.engine.clone(),
            self.clock.clone(),
            definition.id,
            schedule,
            first,
        ));

        self.timers
            .lock()
            .await
            .insert(definition.id, ActiveTimer { expression: expression.clone(), task });

        info!(workflow_id = %definition.id, %expression, next_fire = %first, "schedule registered");
        Ok(true)
    }

    /// Cancel the timer for `workflow_id`. Returns `false` if there was none.
    pub async fn unregister(&self, workflow_id: Uuid) -> bool {
        let removed = self.timers.lock().await.remove(&workflow_id);
        if let Some(timer) = &removed {
            info!(%workflow_id, expression = %timer.expression, "schedule unregistered");
        }
        removed.is_some()
    }

    /// Cancel-then-register. Called on every update that may affect scheduling.
    pub async fn reconcile(&self, definition: &WorkflowDefinition) -> Result<bool, DefinitionError> {
        self.unregister(definition.id).await;
        self.register(definition).await
    }

    /// Register every enabled schedule-triggered definition in the registry.
    ///
    /// Definitions whose schedule no longer validates are skipped with a
    /// warning. Returns the number of timers installed.
    pub async fn bootstrap(&self) -> Result<usize, StoreError> {
        let definitions = self
            .engine
            .definitions()
            .list_enabled_by_trigger("schedule", None)
            .await?;

        let mut registered = 0;
        for definition in &definitions {
            match self.register(definition).await {
                Ok(true) => registered += 1,
                Ok(false) => {}
                Err(e) => warn!(workflow_id = %definition.id, error = %e, "skipping invalid schedule"),
            }
        }
        info!(registered, "scheduler bootstrapped");
        Ok(registered)
    }

    pub async fn is_registered(&self, workflow_id: Uuid) -> bool {
        self.timers.lock().await.contains_key(&workflow_id)
    }

    pub async fn active_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Cancel every timer. Runs already started are not affected.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        info!(count = timers.len(), "cancelling scheduled timers");
        timers.clear();
    }
}

async fn run_timer(
    engine: WorkflowEngine,
    clock: Arc<dyn Clock>,
    workflow_id: Uuid,
    schedule: CronSchedule,
    mut next: DateTime<Utc>,
) {
    loop {
        clock.sleep_until(next).await;
        fire(&engine, workflow_id, schedule.expression(), next).await;

        // Anything missed while we were busy collapses into the next future slot.
        let after = clock.now().max(next);
        match schedule.next_after(after) {
            Some(t) => next = t,
            None => {
                warn!(%workflow_id, expression = %schedule, "schedule has no further firings");
                return;
            }
        }
    }
}

/// Start a run for the latest stored definition without waiting for it.
///
/// A timer whose `expression` no longer matches the stored schedule is stale
/// and starts nothing.
async fn fire(engine: &WorkflowEngine, workflow_id: Uuid, expression: &str, scheduled_at: DateTime<Utc>) {
    let definition = match engine.definitions().get(workflow_id).await {
        Ok(Some(definition)) if definition.is_scheduled() => definition,
        Ok(_) => {
            debug!(%workflow_id, "scheduled firing skipped: workflow missing or disabled");
            return;
        }
        Err(e) => {
            error!(%workflow_id, error = %e, "scheduled firing skipped: could not load workflow");
            return;
        }
    };

    if definition.trigger.schedule_expression() != Some(expression) {
        warn!(%workflow_id, %expression, "scheduled firing skipped: timer is stale for the stored schedule");
        return;
    }

    let input = json!({ "scheduled_at": scheduled_at.to_rfc3339() });
    match engine.start_definition(definition, input).await {
        Ok(handle) => info!(%workflow_id, run_id = %handle.id, %scheduled_at, "scheduled run started"),
        Err(e) => error!(%workflow_id, error = %e, "scheduled run failed to start"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{ActionDefinition, DefinitionPatch, NewWorkflow, RunStatus, Trigger};
    use crate::store::{InMemoryDefinitionRegistry, InMemoryRunStore};
    use crate::EngineConfig;
    use actions::handlers::{ConditionHandler, WaitHandler};
    use actions::mock::MockHandler;
    use actions::{ActionRegistry, ActionType};
    use chrono::{Duration, TimeZone};
    use serde_json::Value;

    struct Fixture {
        engine: WorkflowEngine,
        clock: Arc<ManualClock>,
        scheduler: Scheduler,
    }

    fn fixture() -> Fixture {
        let mut registry = ActionRegistry::new();
        registry
            .register(Arc::new(ConditionHandler))
            .register(Arc::new(WaitHandler))
            .register(Arc::new(MockHandler::returning(ActionType::Task, json!({}))));
        let engine = WorkflowEngine::new(
            registry,
            Arc::new(InMemoryDefinitionRegistry::new()),
            Arc::new(InMemoryRunStore::new()),
            EngineConfig::default(),
        );
        // Half a minute before the first every-minute boundary.
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let scheduler = Scheduler::new(engine.clone(), clock.clone());
        Fixture { engine, clock, scheduler }
    }

    async fn store(engine: &WorkflowEngine, expression: &str, enabled: bool) -> WorkflowDefinition {
        let mut new = NewWorkflow::new(
            "tick",
            Trigger::Schedule { expression: expression.into() },
            vec![
                ActionDefinition::new(
                    "has_slot",
                    ActionType::Condition,
                    json!({ "field": "trigger.scheduled_at", "operator": "exists" }),
                ),
                ActionDefinition::new("t", ActionType::Task, Value::Null),
            ],
        );
        new.enabled = enabled;
        engine.definitions().create(new.into_definition(Utc::now())).await.unwrap()
    }

    async fn run_count(engine: &WorkflowEngine, id: Uuid) -> usize {
        engine.get_run_history(id, Some(100)).await.unwrap().len()
    }

    async fn run_finished(engine: &WorkflowEngine, run_id: Uuid) -> crate::models::WorkflowRun {
        for _ in 0..200 {
            let run = engine.get_run(run_id).await.unwrap();
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        engine.get_run(run_id).await.unwrap()
    }

    /// Give timer tasks real time to react, then report the run count.
    async fn settle(engine: &WorkflowEngine, id: Uuid, expected: usize) -> usize {
        for _ in 0..200 {
            if run_count(engine, id).await >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        run_count(engine, id).await
    }

    #[tokio::test]
    async fn fires_on_each_boundary_with_scheduled_at() {
        let f = fixture();
        let def = store(&f.engine, "* * * * *", true).await;
        assert!(f.scheduler.register(&def).await.unwrap());

        f.clock.advance(Duration::seconds(30));
        assert_eq!(settle(&f.engine, def.id, 1).await, 1);

        f.clock.advance(Duration::minutes(1));
        assert_eq!(settle(&f.engine, def.id, 2).await, 2);

        // The condition only passes when the firing supplied `scheduled_at`.
        let history = f.engine.get_run_history(def.id, None).await.unwrap();
        for run in &history {
            let run = run_finished(&f.engine, run.id).await;
            assert_eq!(run.status, RunStatus::Completed);
            assert_eq!(run.action_logs().count(), 2);
        }
    }

    #[tokio::test]
    async fn a_hung_run_does_not_block_the_next_firing() {
        let f = fixture();
        let new = NewWorkflow::new(
            "slow tick",
            Trigger::Schedule { expression: "* * * * *".into() },
            vec![ActionDefinition::new(
                "hang",
                ActionType::Wait,
                json!({ "duration": 1, "unit": "hours" }),
            )],
        );
        let def = f.engine.definitions().create(new.into_definition(Utc::now())).await.unwrap();
        f.scheduler.register(&def).await.unwrap();

        f.clock.advance(Duration::seconds(30));
        assert_eq!(settle(&f.engine, def.id, 1).await, 1);
        f.clock.advance(Duration::minutes(1));
        assert_eq!(settle(&f.engine, def.id, 2).await, 2);

        // Both runs are still inside the wait at the same time.
        let running: Vec<_> = f
            .engine
            .list_running_runs()
            .await
            .unwrap()
            .into_iter()
            .filter(|run| run.workflow_id == def.id)
            .collect();
        assert_eq!(running.len(), 2);
        assert_ne!(running[0].id, running[1].id);
    }

    #[tokio::test]
    async fn missed_firings_collapse_into_one() {
        let f = fixture();
        let def = store(&f.engine, "* * * * *", true).await;
        f.scheduler.register(&def).await.unwrap();

        f.clock.advance(Duration::minutes(10));
        assert_eq!(settle(&f.engine, def.id, 1).await, 1);
    }

    #[tokio::test]
    async fn reconcile_leaves_exactly_one_timer() {
        let f = fixture();
        let def = store(&f.engine, "*/5 * * * *", true).await;
        f.scheduler.register(&def).await.unwrap();

        let mut updated = def.clone();
        updated.trigger = Trigger::Schedule { expression: "* * * * *".into() };
        f.engine.definitions().update(updated.clone()).await.unwrap();

        assert!(f.scheduler.reconcile(&updated).await.unwrap());
        assert!(f.scheduler.reconcile(&updated).await.unwrap());
        assert_eq!(f.scheduler.active_count().await, 1);

        f.clock.advance(Duration::seconds(30));
        assert_eq!(settle(&f.engine, def.id, 1).await, 1);
    }

    #[tokio::test]
    async fn unregister_stops_future_firings() {
        let f = fixture();
        let def = store(&f.engine, "* * * * *", true).await;
        f.scheduler.register(&def).await.unwrap();

        assert!(f.scheduler.unregister(def.id).await);
        assert!(!f.scheduler.unregister(def.id).await);
        assert!(!f.scheduler.is_registered(def.id).await);

        f.clock.advance(Duration::minutes(5));
        assert_eq!(settle(&f.engine, def.id, 1).await, 0);
    }

    #[tokio::test]
    async fn invalid_expression_is_reported_to_the_caller() {
        let f = fixture();
        let mut def = store(&f.engine, "* * * * *", true).await;
        def.trigger = Trigger::Schedule { expression: "every tuesday".into() };

        let err = f.scheduler.register(&def).await.unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidSchedule { .. }));
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn disabled_and_manual_definitions_get_no_timer() {
        let f = fixture();
        let disabled = store(&f.engine, "* * * * *", false).await;
        assert!(!f.scheduler.register(&disabled).await.unwrap());

        let manual = WorkflowDefinition::new("m", Trigger::Manual, vec![]);
        assert!(!f.scheduler.register(&manual).await.unwrap());
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn firing_skips_a_definition_disabled_since_registration() {
        let f = fixture();
        let mut def = store(&f.engine, "* * * * *", true).await;
        f.scheduler.register(&def).await.unwrap();

        DefinitionPatch::enabled(false).apply(&mut def, Utc::now());
        f.engine.definitions().update(def.clone()).await.unwrap();

        f.clock.advance(Duration::seconds(30));
        assert_eq!(settle(&f.engine, def.id, 1).await, 0);
    }

    #[tokio::test]
    async fn timer_for_a_replaced_schedule_starts_nothing() {
        let f = fixture();
        let mut def = store(&f.engine, "* * * * *", true).await;
        f.scheduler.register(&def).await.unwrap();

        // The stored schedule moves on without the timer being reconciled.
        def.trigger = Trigger::Schedule { expression: "0 3 * * *".into() };
        f.engine.definitions().update(def.clone()).await.unwrap();

        f.clock.advance(Duration::seconds(30));
        assert_eq!(settle(&f.engine, def.id, 1).await, 0);
    }

    #[tokio::test]
    async fn bootstrap_registers_enabled_schedules_only() {
        let f = fixture();
        let on = store(&f.engine, "0 * * * *", true).await;
        store(&f.engine, "0 * * * *", false).await;
        f.engine
            .definitions()
            .create(WorkflowDefinition::new("m", Trigger::Manual, vec![]))
            .await
            .unwrap();

        assert_eq!(f.scheduler.bootstrap().await.unwrap(), 1);
        assert!(f.scheduler.is_registered(on.id).await);

        f.scheduler.shutdown().await;
        assert_eq!(f.scheduler.active_count().await, 0);
    }
}
