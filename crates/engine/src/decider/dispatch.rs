//! Decider trait and dispatch on the decision type

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{error, warn};

use super::decision::{Decision, StepDecision, DECIDER_NOT_FOUND, STATE_UNDEFINED};
use super::DeciderError;
use crate::context::DecisionContext;
use crate::history::EventType;
use crate::state::{SchedulableState, WorkflowState};
use crate::workflow::Workflow;

/// One handler per decision type
///
/// Every handler defaults to "no decisions". [`Workflow`] overrides the ones
/// that drive a step tree.
pub trait Decider: Send + Sync {
    fn on_workflow_execution_started(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_workflow_execution_continued_as_new(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_workflow_execution_cancel_requested(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_workflow_execution_signaled(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_activity_task_completed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_activity_task_failed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_activity_task_timed_out(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_schedule_activity_task_failed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_start_child_workflow_execution_initiated(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_start_child_workflow_execution_failed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_child_workflow_execution_started(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_child_workflow_execution_completed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_child_workflow_execution_failed(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_child_workflow_execution_terminated(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_child_workflow_execution_timed_out(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_timer_started(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_timer_fired(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }

    fn on_timer_canceled(
        &self,
        _context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Run the handler matching the context's decision type
///
/// Without a decider the only decision is a workflow failure. Handler errors
/// become a workflow failure too; only an unmapped decision type is returned
/// as an error.
pub fn make_decision(
    decider: Option<&dyn Decider>,
    context: &DecisionContext,
    state: &mut WorkflowState,
) -> Result<StepDecision, DeciderError> {
    let workflow_id = context.workflow_id.as_deref().unwrap_or_default();

    let Some(decider) = decider else {
        warn!(%workflow_id, "no decider for execution");
        return Ok(vec![Decision::fail(
            DECIDER_NOT_FOUND,
            format!("WorkflowId: {workflow_id}"),
        )]);
    };

    let Some(decision_type) = context.decision_type else {
        return Err(DeciderError::UnhandledDecisionType("none".to_string()));
    };

    let handled = match decision_type {
        EventType::WorkflowExecutionStarted => decider.on_workflow_execution_started(context, state),
        EventType::WorkflowExecutionContinuedAsNew => {
            decider.on_workflow_execution_continued_as_new(context, state)
        }
        EventType::WorkflowExecutionCancelRequested => {
            decider.on_workflow_execution_cancel_requested(context, state)
        }
        EventType::WorkflowExecutionSignaled => decider.on_workflow_execution_signaled(context, state),
        EventType::ActivityTaskCompleted => decider.on_activity_task_completed(context, state),
        EventType::ActivityTaskFailed => decider.on_activity_task_failed(context, state),
        EventType::ActivityTaskTimedOut => decider.on_activity_task_timed_out(context, state),
        EventType::ScheduleActivityTaskFailed => {
            decider.on_schedule_activity_task_failed(context, state)
        }
        EventType::StartChildWorkflowExecutionInitiated => {
            decider.on_start_child_workflow_execution_initiated(context, state)
        }
        EventType::StartChildWorkflowExecutionFailed => {
            decider.on_start_child_workflow_execution_failed(context, state)
        }
        EventType::ChildWorkflowExecutionStarted => {
            decider.on_child_workflow_execution_started(context, state)
        }
        EventType::ChildWorkflowExecutionCompleted => {
            decider.on_child_workflow_execution_completed(context, state)
        }
        EventType::ChildWorkflowExecutionFailed => {
            decider.on_child_workflow_execution_failed(context, state)
        }
        EventType::ChildWorkflowExecutionTerminated => {
            decider.on_child_workflow_execution_terminated(context, state)
        }
        EventType::ChildWorkflowExecutionTimedOut => {
            decider.on_child_workflow_execution_timed_out(context, state)
        }
        EventType::TimerStarted => decider.on_timer_started(context, state),
        EventType::TimerFired => decider.on_timer_fired(context, state),
        EventType::TimerCanceled => decider.on_timer_canceled(context, state),
        other => return Err(DeciderError::UnhandledDecisionType(other.to_string())),
    };

    match handled {
        Ok(decisions) => Ok(decisions),
        Err(DeciderError::UnhandledDecisionType(t)) => Err(DeciderError::UnhandledDecisionType(t)),
        Err(e) => {
            error!(%workflow_id, %decision_type, error = %e, "decider failed");
            Ok(vec![Decision::fail(e.to_string(), workflow_id)])
        }
    }
}

// =============================================================================
// Step tree decider
// =============================================================================

impl Decider for Workflow {
    fn on_workflow_execution_started(
        &self,
        context: &DecisionContext,
        state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        *state = WorkflowState::new(0);
        self.schedule_step(state, 0, context.input.as_deref().unwrap_or_default(), 0)
    }

    fn on_workflow_execution_continued_as_new(
        &self,
        context: &DecisionContext,
        state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        *state = WorkflowState::new(0);
        self.schedule_step(state, 0, context.input.as_deref().unwrap_or_default(), 0)
    }

    fn on_workflow_execution_cancel_requested(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(vec![Decision::cancel(
            context.cause.clone().unwrap_or_default(),
        )])
    }

    fn on_activity_task_completed(
        &self,
        context: &DecisionContext,
        state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.next_step(context, state)
    }

    fn on_activity_task_failed(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.retry_or_fail(
            context,
            context.reason.as_deref().unwrap_or_default(),
            context.details.as_deref().unwrap_or_default(),
        )
    }

    fn on_activity_task_timed_out(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.retry_or_fail(
            context,
            context.timeout_type.as_deref().unwrap_or_default(),
            context.details.as_deref().unwrap_or_default(),
        )
    }

    fn on_schedule_activity_task_failed(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(vec![Decision::fail(
            context.cause.clone().unwrap_or_default(),
            context.activity_id.clone().unwrap_or_default(),
        )])
    }

    fn on_start_child_workflow_execution_failed(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        Ok(vec![Decision::fail(
            context.cause.clone().unwrap_or_default(),
            context.child_workflow_id.clone().unwrap_or_default(),
        )])
    }

    fn on_child_workflow_execution_completed(
        &self,
        context: &DecisionContext,
        state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.next_step(context, state)
    }

    fn on_child_workflow_execution_failed(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.retry_or_fail(
            context,
            context.reason.as_deref().unwrap_or_default(),
            context.details.as_deref().unwrap_or_default(),
        )
    }

    fn on_child_workflow_execution_terminated(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.retry_or_fail(
            context,
            &EventType::ChildWorkflowExecutionTerminated.to_string(),
            context.details.as_deref().unwrap_or_default(),
        )
    }

    fn on_child_workflow_execution_timed_out(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        self.retry_or_fail(
            context,
            context.timeout_type.as_deref().unwrap_or_default(),
            context.details.as_deref().unwrap_or_default(),
        )
    }

    /// Schedule every action whose delay timer fired and is still open
    ///
    /// Several timers of one fan-out can fire before the next decision task,
    /// so the triggering timer is not the only one due.
    fn on_timer_fired(
        &self,
        context: &DecisionContext,
        _state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        let mut due: BTreeSet<&str> = context
            .fired_timers
            .keys()
            .filter(|id| context.timers.contains_key(*id))
            .map(String::as_str)
            .collect();
        if let Some(timer_id) = context.timer_id.as_deref() {
            if context.timers.contains_key(timer_id) {
                due.insert(timer_id);
            }
        }
        if due.is_empty() {
            warn!(timer_id = ?context.timer_id, "fired timer is not open");
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut decisions = Vec::new();
        for timer_id in due {
            let control = context.timers.get(timer_id).and_then(|t| t.control.as_deref());
            let Some(state) = SchedulableState::decode(control)? else {
                return Ok(vec![Decision::fail(STATE_UNDEFINED, timer_id)]);
            };
            let input = context.markers.get(timer_id).cloned().unwrap_or_default();
            decisions.extend(self.schedule_state(state.with_delay(0), &input, now)?);
        }
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{TimerFiredAttributes, TimerStartedAttributes};
    use crate::workflow::{Action, Activity, ActivityOptions, WorkflowOptions};

    fn workflow() -> Workflow {
        Workflow::new(WorkflowOptions::new("orders", "tl"))
            .with_step("validate", Action::Activity(Activity::new("validate")))
            .unwrap()
    }

    fn context_of(decision_type: EventType) -> DecisionContext {
        DecisionContext {
            decision_type: Some(decision_type),
            workflow_id: Some("wf-1".into()),
            input: Some("in".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_decider_fails_workflow() {
        let context = context_of(EventType::WorkflowExecutionStarted);
        let decisions = make_decision(None, &context, &mut WorkflowState::default()).unwrap();

        assert_eq!(
            decisions,
            vec![Decision::fail(DECIDER_NOT_FOUND, "WorkflowId: wf-1")]
        );
    }

    #[test]
    fn test_started_schedules_first_step() {
        let workflow = workflow();
        let context = context_of(EventType::WorkflowExecutionStarted);
        let mut state = WorkflowState::default();

        let decisions = make_decision(Some(&workflow), &context, &mut state).unwrap();
        assert!(matches!(&decisions[..], [Decision::ScheduleActivityTask(t)] if t.input == "in"));
        assert_eq!(state, WorkflowState::new(0));
    }

    #[test]
    fn test_unmapped_type_is_an_error() {
        let workflow = workflow();
        let context = context_of(EventType::MarkerRecorded);

        assert!(matches!(
            make_decision(Some(&workflow), &context, &mut WorkflowState::default()),
            Err(DeciderError::UnhandledDecisionType(t)) if t == "MarkerRecorded"
        ));

        let empty = DecisionContext::default();
        assert!(make_decision(Some(&workflow), &empty, &mut WorkflowState::default()).is_err());
    }

    #[test]
    fn test_handler_error_becomes_failure() {
        let workflow = workflow();
        let mut context = context_of(EventType::ActivityTaskFailed);
        context.control = Some("{not json".into());

        let decisions = make_decision(Some(&workflow), &context, &mut WorkflowState::default())
            .unwrap();
        assert!(matches!(
            &decisions[..],
            [Decision::FailWorkflowExecution { details, .. }] if details == "wf-1"
        ));
    }

    #[test]
    fn test_cancel_request_cancels() {
        let mut context = context_of(EventType::WorkflowExecutionCancelRequested);
        context.cause = Some("operator".into());

        let decisions =
            make_decision(Some(&workflow()), &context, &mut WorkflowState::default()).unwrap();
        assert_eq!(decisions, vec![Decision::cancel("operator")]);
    }

    #[test]
    fn test_schedule_failures_fail_with_cause() {
        let mut context = context_of(EventType::ScheduleActivityTaskFailed);
        context.cause = Some("ACTIVITY_TYPE_DOES_NOT_EXIST".into());
        context.activity_id = Some("__validate._0._0._0".into());

        let decisions =
            make_decision(Some(&workflow()), &context, &mut WorkflowState::default()).unwrap();
        assert_eq!(
            decisions,
            vec![Decision::fail(
                "ACTIVITY_TYPE_DOES_NOT_EXIST",
                "__validate._0._0._0"
            )]
        );
    }

    #[test]
    fn test_timer_fired_schedules_with_marker_input() {
        let delayed = Activity::new("validate").with_options(ActivityOptions::new().with_delay(10));
        let workflow = Workflow::new(WorkflowOptions::new("orders", "tl"))
            .with_step("validate", Action::Activity(delayed))
            .unwrap();
        let control = SchedulableState::new(0, "validate", 0, 1)
            .with_delay(10)
            .encode()
            .unwrap();

        let mut context = context_of(EventType::TimerFired);
        context.timer_id = Some("t".into());
        context.timers.insert(
            "t".into(),
            TimerStartedAttributes {
                timer_id: "t".into(),
                start_to_fire_timeout: "10".into(),
                control: Some(control),
            },
        );
        context.markers.insert("t".into(), "delayed-input".into());

        let decisions =
            make_decision(Some(&workflow), &context, &mut WorkflowState::default()).unwrap();
        assert!(matches!(
            &decisions[..],
            [Decision::ScheduleActivityTask(t)] if t.input == "delayed-input"
        ));
    }

    #[test]
    fn test_every_open_fired_timer_is_scheduled() {
        let delayed = Activity::new("validate").with_options(ActivityOptions::new().with_delay(10));
        let workflow = Workflow::new(WorkflowOptions::new("orders", "tl"))
            .with_step("validate", Action::Activity(delayed))
            .unwrap();

        let mut context = context_of(EventType::TimerFired);
        for (timer_id, action) in [("t0", 0), ("t1", 1)] {
            let control = SchedulableState::new(0, "validate", action, 2)
                .with_delay(10)
                .encode()
                .unwrap();
            let timer = TimerStartedAttributes {
                timer_id: timer_id.into(),
                start_to_fire_timeout: "10".into(),
                control: Some(control),
            };
            context.timers.insert(timer_id.into(), timer);
            context.fired_timers.insert(
                timer_id.into(),
                TimerFiredAttributes {
                    timer_id: timer_id.into(),
                    started_event_id: 0,
                },
            );
            context.markers.insert(timer_id.into(), format!("input-{action}"));
        }
        // already scheduled in an earlier cycle
        context.fired_timers.insert(
            "t-old".into(),
            TimerFiredAttributes {
                timer_id: "t-old".into(),
                started_event_id: 0,
            },
        );
        context.timer_id = Some("t1".into());

        let decisions =
            make_decision(Some(&workflow), &context, &mut WorkflowState::default()).unwrap();
        let inputs: Vec<&str> = decisions
            .iter()
            .map(|d| match d {
                Decision::ScheduleActivityTask(t) => t.input.as_str(),
                other => panic!("unexpected decision: {other:?}"),
            })
            .collect();
        assert_eq!(inputs, ["input-0", "input-1"]);
    }

    #[test]
    fn test_informational_types_decide_nothing() {
        for decision_type in [
            EventType::TimerStarted,
            EventType::TimerCanceled,
            EventType::ChildWorkflowExecutionStarted,
            EventType::StartChildWorkflowExecutionInitiated,
            EventType::WorkflowExecutionSignaled,
        ] {
            let decisions = make_decision(
                Some(&workflow()),
                &context_of(decision_type),
                &mut WorkflowState::default(),
            )
            .unwrap();
            assert!(decisions.is_empty(), "{decision_type} produced decisions");
        }
    }
}
