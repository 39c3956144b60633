//! Per-event fold rules

use tracing::{trace, warn};

use crate::history::{find_event, EventAttributes, HistoryEvent};
use crate::state::{SchedulableState, WorkflowState};

use super::DecisionContext;

/// Apply one event to the context
///
/// `history` holds the events processed so far (at least); it is used to look
/// up the scheduled or initiated event a completion refers to.
pub fn process_event(
    context: &mut DecisionContext,
    event: &HistoryEvent,
    history: &[HistoryEvent],
) {
    let event_type = event.event_type();
    trace!(event_id = event.event_id, %event_type, "processing event");

    match &event.attributes {
        // =====================================================================
        // Workflow execution
        // =====================================================================
        EventAttributes::WorkflowExecutionStarted(a) => {
            context.decision_type = Some(event_type);
            context.set_input(a.input.clone());
            context.starting_input = a.input.clone();
            context.parent_workflow_id = a
                .parent_workflow_execution
                .as_ref()
                .map(|p| p.workflow_id.clone());
            if context.workflow_name.is_none() {
                context.workflow_name = Some(a.workflow_type.name.clone());
                context.workflow_version = Some(a.workflow_type.version.clone());
            }
            context.add_input(a.input.as_deref());
        }
        EventAttributes::WorkflowExecutionContinuedAsNew(a) => {
            context.decision_type = Some(event_type);
            context.set_input(a.input.clone());
        }
        EventAttributes::WorkflowExecutionCancelRequested(a) => {
            context.decision_type = Some(event_type);
            context.cause = a.cause.clone();
        }
        EventAttributes::WorkflowExecutionSignaled(a) => {
            context.decision_type = Some(event_type);
            context.signal_name = Some(a.signal_name.clone());
            context.set_input(a.input.clone());
        }

        // =====================================================================
        // Decision tasks
        // =====================================================================
        EventAttributes::DecisionTaskCompleted(a) => {
            context.scheduled_event_id = a.scheduled_event_id;
            context.started_event_id = a.started_event_id;
            context.execution_context = match WorkflowState::decode(a.execution_context.as_deref())
            {
                Ok(state) => state,
                Err(e) => {
                    warn!(event_id = event.event_id, error = %e, "undecodable execution context");
                    None
                }
            };
        }

        // =====================================================================
        // Activities
        // =====================================================================
        EventAttributes::ActivityTaskScheduled(a) => {
            context.activity_id = Some(a.activity_id.clone());
            context.activity_name = Some(a.activity_type.name.clone());
            context.activity_version = Some(a.activity_type.version.clone());
            context.control = a.control.clone();
            context.set_input(a.input.clone());
            remove_superseded_timer(context, a.control.as_deref());
        }
        EventAttributes::ActivityTaskCompleted(a) => {
            context.decision_type = Some(event_type);
            context.scheduled_event_id = a.scheduled_event_id;
            context.started_event_id = a.started_event_id;
            context.set_result(a.result.clone());
            apply_scheduled_activity(context, a.scheduled_event_id, history);
            let input = context.input_ref.clone();
            context.add_input(input.as_deref());
            context.add_result(a.result.as_deref());
        }
        EventAttributes::ActivityTaskFailed(a) => {
            context.decision_type = Some(event_type);
            context.scheduled_event_id = a.scheduled_event_id;
            context.started_event_id = a.started_event_id;
            context.details = a.details.clone();
            context.reason = a.reason.clone();
            apply_scheduled_activity(context, a.scheduled_event_id, history);
        }
        EventAttributes::ActivityTaskTimedOut(a) => {
            context.decision_type = Some(event_type);
            context.scheduled_event_id = a.scheduled_event_id;
            context.started_event_id = a.started_event_id;
            context.details = a.details.clone();
            context.timeout_type = Some(a.timeout_type.clone());
            apply_scheduled_activity(context, a.scheduled_event_id, history);
        }
        EventAttributes::ScheduleActivityTaskFailed(a) => {
            context.decision_type = Some(event_type);
            context.activity_id = Some(a.activity_id.clone());
            context.activity_name = Some(a.activity_type.name.clone());
            context.activity_version = Some(a.activity_type.version.clone());
            context.decision_task_completed_event_id = a.decision_task_completed_event_id;
            context.cause = Some(a.cause.clone());
        }

        // =====================================================================
        // Child workflows
        // =====================================================================
        EventAttributes::StartChildWorkflowExecutionInitiated(a) => {
            context.decision_type = Some(event_type);
            context.child_workflow_id = Some(a.workflow_id.clone());
            context.child_workflow_name = Some(a.workflow_type.name.clone());
            context.child_workflow_version = Some(a.workflow_type.version.clone());
            context.control = a.control.clone();
            context.set_input(a.input.clone());
            context.add_input(a.input.as_deref());
            remove_superseded_timer(context, a.control.as_deref());
        }
        EventAttributes::StartChildWorkflowExecutionFailed(a) => {
            context.decision_type = Some(event_type);
            context.child_workflow_id = Some(a.workflow_id.clone());
            context.child_workflow_name = Some(a.workflow_type.name.clone());
            context.child_workflow_version = Some(a.workflow_type.version.clone());
            context.cause = Some(a.cause.clone());
            context.control = a.control.clone();
        }
        EventAttributes::ChildWorkflowExecutionStarted(a) => {
            context.decision_type = Some(event_type);
            context.child_workflow_id = Some(a.workflow_execution.workflow_id.clone());
            context.child_workflow_name = Some(a.workflow_type.name.clone());
            context.child_workflow_version = Some(a.workflow_type.version.clone());
            context.child_run_id = Some(a.workflow_execution.run_id.clone());
        }
        EventAttributes::ChildWorkflowExecutionCompleted(a) => {
            context.decision_type = Some(event_type);
            context.child_run_id = Some(a.workflow_execution.run_id.clone());
            context.set_result(a.result.clone());
            apply_initiated_child(context, a.initiated_event_id, history);
            let input = context.input_ref.clone();
            context.add_input(input.as_deref());
            context.add_result(a.result.as_deref());
        }
        EventAttributes::ChildWorkflowExecutionFailed(a) => {
            context.decision_type = Some(event_type);
            context.child_run_id = Some(a.workflow_execution.run_id.clone());
            context.details = a.details.clone();
            context.reason = a.reason.clone();
            apply_initiated_child(context, a.initiated_event_id, history);
        }
        EventAttributes::ChildWorkflowExecutionTerminated(a) => {
            context.decision_type = Some(event_type);
            context.child_run_id = Some(a.workflow_execution.run_id.clone());
            context.details = Some(String::new());
            apply_initiated_child(context, a.initiated_event_id, history);
        }
        EventAttributes::ChildWorkflowExecutionTimedOut(a) => {
            context.decision_type = Some(event_type);
            context.child_run_id = Some(a.workflow_execution.run_id.clone());
            context.details = Some(String::new());
            context.timeout_type = Some(a.timeout_type.clone());
            apply_initiated_child(context, a.initiated_event_id, history);
        }

        // =====================================================================
        // Markers and timers
        // =====================================================================
        EventAttributes::MarkerRecorded(a) => {
            context.markers.insert(
                a.marker_name.clone(),
                a.details.clone().unwrap_or_default(),
            );
        }
        EventAttributes::TimerStarted(a) => {
            context.decision_type = Some(event_type);
            context.timer_id = Some(a.timer_id.clone());
            context.timers.insert(a.timer_id.clone(), a.clone());
        }
        EventAttributes::TimerFired(a) => {
            context.decision_type = Some(event_type);
            context.timer_id = Some(a.timer_id.clone());
            if context.timers.contains_key(&a.timer_id) {
                context.fired_timers.insert(a.timer_id.clone(), a.clone());
            }
        }
        EventAttributes::TimerCanceled(a) => {
            context.decision_type = Some(event_type);
            context.timer_id = Some(a.timer_id.clone());
            if context.timers.contains_key(&a.timer_id) {
                context.cancelled_timers.insert(a.timer_id.clone(), a.clone());
            }
        }

        EventAttributes::WorkflowExecutionCompleted(_)
        | EventAttributes::DecisionTaskScheduled
        | EventAttributes::DecisionTaskStarted
        | EventAttributes::ActivityTaskStarted(_)
        | EventAttributes::Other { .. } => {}
    }
}

/// Copy identity, control and input from the event that scheduled an activity
fn apply_scheduled_activity(
    context: &mut DecisionContext,
    scheduled_event_id: i64,
    history: &[HistoryEvent],
) {
    match find_event(history, scheduled_event_id).map(|e| &e.attributes) {
        Some(EventAttributes::ActivityTaskScheduled(s)) => {
            context.activity_id = Some(s.activity_id.clone());
            context.activity_name = Some(s.activity_type.name.clone());
            context.activity_version = Some(s.activity_type.version.clone());
            context.control = s.control.clone();
            context.set_input(s.input.clone());
        }
        _ => warn!(scheduled_event_id, "scheduled event not found in history"),
    }
}

/// Copy identity, control and input from the event that initiated a child
fn apply_initiated_child(
    context: &mut DecisionContext,
    initiated_event_id: i64,
    history: &[HistoryEvent],
) {
    match find_event(history, initiated_event_id).map(|e| &e.attributes) {
        Some(EventAttributes::StartChildWorkflowExecutionInitiated(s)) => {
            context.child_workflow_id = Some(s.workflow_id.clone());
            context.child_workflow_name = Some(s.workflow_type.name.clone());
            context.child_workflow_version = Some(s.workflow_type.version.clone());
            context.control = s.control.clone();
            context.set_input(s.input.clone());
        }
        _ => warn!(initiated_event_id, "initiated event not found in history"),
    }
}

/// Drop the open timer whose control names the same action
///
/// Scheduling an action supersedes the delay timer started for it.
fn remove_superseded_timer(context: &mut DecisionContext, control: Option<&str>) {
    let Ok(Some(scheduled)) = SchedulableState::decode(control) else {
        return;
    };

    let superseded = context.timers.iter().find_map(|(id, timer)| {
        match SchedulableState::decode(timer.control.as_deref()) {
            Ok(Some(state)) if state == scheduled => Some(id.clone()),
            _ => None,
        }
    });

    if let Some(timer_id) = superseded {
        context.timers.remove(&timer_id);
        context.fired_timers.remove(&timer_id);
    }
}
