//! Definition validation. Run it before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. The name is non-empty and the trigger is well-formed (a schedule
//!    expression parses and fires, an event name is present).
//! 2. Action IDs are unique within the workflow and none uses the reserved
//!    `system` log source.
//! 3. Every `next_actions` entry references an action in the workflow.
//! 4. The successor graph is acyclic. An action's successors are its
//!    `next_actions`, or the positionally following action when that list
//!    is empty.
//!
//! [`ActionWalk`] then yields actions in execution order for one run.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::models::{ActionDefinition, Trigger, WorkflowDefinition, SYSTEM_SOURCE};
use crate::schedule::{CronSchedule, ScheduleError};
use crate::DefinitionError;

/// Validate everything about a definition that can be checked statically.
pub fn validate_definition(
    definition: &WorkflowDefinition,
    now: DateTime<Utc>,
) -> Result<(), DefinitionError> {
    if definition.name.trim().is_empty() {
        return Err(DefinitionError::EmptyName);
    }
    validate_trigger(&definition.trigger, now)?;
    validate_action_graph(&definition.actions)?;
    Ok(())
}

/// Check the trigger; for schedules, parse and return the expression.
pub fn validate_trigger(
    trigger: &Trigger,
    now: DateTime<Utc>,
) -> Result<Option<CronSchedule>, DefinitionError> {
    match trigger {
        Trigger::Manual => Ok(None),
        Trigger::Event { event } if event.trim().is_empty() => Err(DefinitionError::EmptyEventName),
        Trigger::Event { .. } => Ok(None),
        Trigger::Schedule { expression } => {
            let invalid = |source| DefinitionError::InvalidSchedule {
                expression: expression.clone(),
                source,
            };
            let schedule = CronSchedule::parse(expression).map_err(invalid)?;
            if schedule.next_after(now).is_none() {
                return Err(invalid(ScheduleError::NeverFires));
            }
            Ok(Some(schedule))
        }
    }
}

/// Indices of the actions that follow `index` once it succeeds.
fn successors(actions: &[ActionDefinition], index: usize, by_id: &HashMap<&str, usize>) -> Vec<usize> {
    let action = &actions[index];
    if action.next_actions.is_empty() {
        return if index + 1 < actions.len() { vec![index + 1] } else { Vec::new() };
    }
    action
        .next_actions
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .collect()
}

/// Validate the action graph and return action IDs in a topological order.
///
/// # Errors
/// - [`DefinitionError::DuplicateActionId`] if two actions share an ID.
/// - [`DefinitionError::UnknownNextAction`] if `next_actions` names a missing action.
/// - [`DefinitionError::CycleDetected`] if the graph is not acyclic.
pub fn validate_action_graph(actions: &[ActionDefinition]) -> Result<Vec<String>, DefinitionError> {
    // -----------------------------------------------------------------------
    // 1. Ensure action IDs are unique
    // -----------------------------------------------------------------------
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(actions.len());
    for (index, action) in actions.iter().enumerate() {
        if action.id == SYSTEM_SOURCE {
            return Err(DefinitionError::ReservedActionId(action.id.clone()));
        }
        if by_id.insert(action.id.as_str(), index).is_some() {
            return Err(DefinitionError::DuplicateActionId(action.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate successor references
    // -----------------------------------------------------------------------
    for action in actions {
        if let Some(next) = action.next_actions.iter().find(|n| !by_id.contains_key(n.as_str())) {
            return Err(DefinitionError::UnknownNextAction {
                action_id: action.id.clone(),
                next: next.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let adjacency: Vec<Vec<usize>> = (0..actions.len())
        .map(|i| successors(actions, i, &by_id))
        .collect();

    let mut in_degree = vec![0usize; actions.len()];
    for targets in &adjacency {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..actions.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(actions.len());

    while let Some(index) = queue.pop_front() {
        sorted.push(actions[index].id.clone());
        for &next in &adjacency[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    // If we didn't visit every action the graph contains a cycle.
    if sorted.len() != actions.len() {
        return Err(DefinitionError::CycleDetected);
    }

    Ok(sorted)
}

/// Sequential walk over a validated action graph.
///
/// Starts at the first action. After [`ActionWalk::advance`] marks an action
/// as succeeded its successors join a FIFO worklist; an action already run
/// or queued is not queued twice.
pub struct ActionWalk<'a> {
    actions: &'a [ActionDefinition],
    by_id: HashMap<&'a str, usize>,
    queue: VecDeque<usize>,
    seen: HashSet<usize>,
}

impl<'a> ActionWalk<'a> {
    pub fn new(actions: &'a [ActionDefinition]) -> Self {
        let by_id = actions.iter().enumerate().map(|(i, a)| (a.id.as_str(), i)).collect();
        let mut walk = Self {
            actions,
            by_id,
            queue: VecDeque::new(),
            seen: HashSet::new(),
        };
        if !actions.is_empty() {
            walk.enqueue(0);
        }
        walk
    }

    fn enqueue(&mut self, index: usize) {
        if self.seen.insert(index) {
            self.queue.push_back(index);
        }
    }

    /// The next action to execute, if any.
    pub fn next_action(&mut self) -> Option<(usize, &'a ActionDefinition)> {
        let index = self.queue.pop_front()?;
        Some((index, &self.actions[index]))
    }

    /// Record that the action at `index` succeeded and queue its successors.
    pub fn advance(&mut self, index: usize) {
        for next in successors(self.actions, index, &self.by_id) {
            self.enqueue(next);
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use actions::ActionType;
    use serde_json::Value;

    fn action(id: &str) -> ActionDefinition {
        ActionDefinition::new(id, ActionType::Wait, Value::Null)
    }

    fn walk_all(actions: &[ActionDefinition]) -> Vec<String> {
        let mut walk = ActionWalk::new(actions);
        let mut order = Vec::new();
        while let Some((index, action)) = walk.next_action() {
            order.push(action.id.clone());
            walk.advance(index);
        }
        order
    }

    #[test]
    fn flat_list_walks_in_order() {
        let actions = vec![action("a"), action("b"), action("c")];
        assert_eq!(validate_action_graph(&actions).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(walk_all(&actions), vec!["a", "b", "c"]);
    }

    #[test]
    fn next_actions_skip_and_reorder() {
        // a → c → b; d is never reached.
        let actions = vec![
            action("a").then(["c"]),
            action("b").then(Vec::<String>::new()),
            action("c").then(["b"]),
            action("d"),
        ];
        validate_action_graph(&actions).expect("acyclic");
        // b has no explicit successors so it falls through to c, which was already run.
        assert_eq!(walk_all(&actions), vec!["a", "c", "b"]);
    }

    #[test]
    fn diamond_runs_join_once() {
        let actions = vec![
            action("a").then(["b", "c"]),
            action("b").then(["d"]),
            action("c").then(["d"]),
            action("d"),
        ];
        validate_action_graph(&actions).expect("acyclic");
        assert_eq!(walk_all(&actions), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn duplicate_action_id_is_rejected() {
        let actions = vec![action("a"), action("a")];
        assert_eq!(
            validate_action_graph(&actions),
            Err(DefinitionError::DuplicateActionId("a".into()))
        );
    }

    #[test]
    fn system_action_id_is_reserved() {
        let actions = vec![action("notify"), action("system")];
        assert_eq!(
            validate_action_graph(&actions),
            Err(DefinitionError::ReservedActionId("system".into()))
        );
    }

    #[test]
    fn unknown_next_action_is_rejected() {
        let actions = vec![action("a").then(["ghost"])];
        assert!(matches!(
            validate_action_graph(&actions),
            Err(DefinitionError::UnknownNextAction { next, .. }) if next == "ghost"
        ));
    }

    #[test]
    fn back_edge_is_a_cycle() {
        let actions = vec![action("a"), action("b"), action("c").then(["a"])];
        assert_eq!(validate_action_graph(&actions), Err(DefinitionError::CycleDetected));
    }

    #[test]
    fn empty_pipeline_is_valid() {
        assert!(validate_action_graph(&[]).unwrap().is_empty());
        assert!(walk_all(&[]).is_empty());
    }

    #[test]
    fn schedule_trigger_must_parse_and_fire() {
        let now = Utc::now();
        let ok = Trigger::Schedule { expression: "0 * * * *".into() };
        assert!(validate_trigger(&ok, now).unwrap().is_some());

        let bad = Trigger::Schedule { expression: "every day".into() };
        assert!(matches!(
            validate_trigger(&bad, now),
            Err(DefinitionError::InvalidSchedule { .. })
        ));

        let never = Trigger::Schedule { expression: "0 0 31 2 *".into() };
        assert!(matches!(
            validate_trigger(&never, now),
            Err(DefinitionError::InvalidSchedule { source: ScheduleError::NeverFires, .. })
        ));
    }

    #[test]
    fn event_trigger_needs_a_name() {
        let trigger = Trigger::Event { event: " ".into() };
        assert_eq!(validate_trigger(&trigger, Utc::now()), Err(DefinitionError::EmptyEventName));
    }
}
