//! Decision context rebuilt from history on every decision cycle
//!
//! The context is a pure fold over the ordered events of one execution:
//! feeding the same events twice yields the same context. Nothing in it
//! survives a cycle except what goes back through
//! [`WorkflowState`](crate::state::WorkflowState).

mod fold;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::history::{
    EventType, HistoryEvent, TimerCanceledAttributes, TimerFiredAttributes, TimerStartedAttributes,
};
use crate::state::{SchedulableState, StateError, WorkflowState};
use crate::workflow::StepResult;

pub use fold::process_event;

/// Everything a decider needs to act on one decision task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Type of the last event that asks for a decision
    pub decision_type: Option<EventType>,

    // Identity of the execution being decided
    pub workflow_name: Option<String>,
    pub workflow_version: Option<String>,
    pub workflow_id: Option<String>,
    pub run_id: Option<String>,
    pub parent_workflow_id: Option<String>,

    /// Input of the triggering action, hydrated by the processor
    pub input: Option<String>,
    /// Input as recorded in history (possibly a blob reference)
    pub input_ref: Option<String>,
    /// Input the execution was started with
    pub starting_input: Option<String>,
    /// Result of the triggering action, hydrated by the processor
    pub result: Option<String>,
    /// Result as recorded in history (possibly a blob reference)
    pub result_ref: Option<String>,
    /// Encoded [`SchedulableState`] of the triggering action
    pub control: Option<String>,

    // Triggering activity
    pub activity_id: Option<String>,
    pub activity_name: Option<String>,
    pub activity_version: Option<String>,

    // Triggering child workflow
    pub child_workflow_id: Option<String>,
    pub child_workflow_name: Option<String>,
    pub child_workflow_version: Option<String>,
    pub child_run_id: Option<String>,

    pub timer_id: Option<String>,
    pub signal_name: Option<String>,

    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub decision_task_completed_event_id: i64,

    // Failure information
    pub cause: Option<String>,
    pub details: Option<String>,
    pub reason: Option<String>,
    pub timeout_type: Option<String>,

    /// State handed back with the previous decision (from history)
    pub execution_context: Option<WorkflowState>,
    /// Latest state as reported by the platform's execution description
    pub last_execution_context: Option<WorkflowState>,

    /// Open timers by id
    pub timers: BTreeMap<String, TimerStartedAttributes>,
    pub fired_timers: BTreeMap<String, TimerFiredAttributes>,
    pub cancelled_timers: BTreeMap<String, TimerCanceledAttributes>,

    /// Marker details by marker name, last write wins
    pub markers: BTreeMap<String, String>,

    /// Every input reference seen, in order, without duplicates
    pub inputs: Vec<String>,
    /// Every result reference seen, by step and action number
    pub results: BTreeMap<i32, BTreeMap<i32, String>>,
}

impl DecisionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a complete, ordered history into a fresh context
    pub fn from_history(events: &[HistoryEvent]) -> Self {
        let mut context = Self::new();
        for event in events {
            process_event(&mut context, event, events);
        }
        context
    }

    /// Decode the triggering action's control marker
    pub fn schedulable_state(&self) -> Result<Option<SchedulableState>, StateError> {
        SchedulableState::decode(self.control.as_deref())
    }

    /// Parse the triggering result as a step result envelope
    ///
    /// A missing result is a failure with an empty value. A completed child
    /// workflow that finished with plain text counts as a success.
    pub fn result_object(&self) -> StepResult {
        let raw = self.result.as_deref().unwrap_or_default();
        match StepResult::try_parse(raw) {
            Some(result) => result,
            None if self.decision_type == Some(EventType::ChildWorkflowExecutionCompleted) => {
                StepResult::success(raw.to_string())
            }
            None => StepResult::failure(raw.to_string()),
        }
    }

    /// Result references recorded for one step, ordered by action number
    pub fn step_results(&self, step_number: i32) -> Option<&BTreeMap<i32, String>> {
        self.results.get(&step_number)
    }

    /// Whether this execution was started by a parent workflow
    pub fn is_child(&self) -> bool {
        self.parent_workflow_id.is_some()
    }

    pub(crate) fn set_input(&mut self, input: Option<String>) {
        self.input_ref = input.clone();
        self.input = input;
    }

    pub(crate) fn set_result(&mut self, result: Option<String>) {
        self.result_ref = result.clone();
        self.result = result;
    }

    /// Every blob candidate this execution has seen, for cleanup
    ///
    /// The starting input of a child execution belongs to its parent and is
    /// left out.
    pub fn payload_references(&self) -> Vec<String> {
        let mut references: Vec<String> = self.inputs.clone();
        references.extend(self.results.values().flat_map(|r| r.values().cloned()));
        references.extend(self.input_ref.iter().cloned());
        references.extend(self.result_ref.iter().cloned());
        references.sort();
        references.dedup();

        if let (true, Some(starting)) = (self.is_child(), &self.starting_input) {
            references.retain(|r| r != starting);
        }
        references
    }

    pub(crate) fn add_input(&mut self, input: Option<&str>) {
        if let Some(input) = input.filter(|i| !i.is_empty()) {
            if !self.inputs.iter().any(|i| i == input) {
                self.inputs.push(input.to_string());
            }
        }
    }

    /// Record a result reference under the triggering action
    ///
    /// Without a decodable control marker the result lands under `(0, 0)`.
    pub(crate) fn add_result(&mut self, result: Option<&str>) {
        let Some(result) = result else {
            return;
        };
        let (step, action) = match self.schedulable_state() {
            Ok(Some(state)) => (state.step_number, state.action_number),
            _ => (0, 0),
        };
        self.results
            .entry(step)
            .or_default()
            .insert(action, result.to_string());
    }
}
