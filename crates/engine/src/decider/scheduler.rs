//! Turning a step and its input into scheduling decisions

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::decision::*;
use super::DeciderError;
use crate::history::TypeRef;
use crate::state::{SchedulableState, WorkflowState};
use crate::workflow::ids::{create_action_id, create_activity_version, create_workflow_id};
use crate::workflow::{timeout_to_string, Action, Activity, Workflow};

impl Workflow {
    /// Decisions that start step `step_number` with `input`
    ///
    /// A missing step means the tree is exhausted and the workflow completes
    /// with `input`. Collections fan out into one action per item; an empty
    /// fan-out schedules nothing.
    pub fn schedule_step(
        &self,
        workflow_state: &mut WorkflowState,
        step_number: i32,
        input: &str,
        attempt_number: i32,
    ) -> Result<StepDecision, DeciderError> {
        let Some(step) = self.get_step(step_number) else {
            debug!(workflow = %self.name(), step_number, "no more steps, completing");
            return Ok(vec![Decision::complete(input)]);
        };

        let now = Utc::now();
        let mut decisions = Vec::new();

        match &step.action {
            Action::ActivityCollection(collection) => {
                let branches = match collection.fan_out(input) {
                    Ok(branches) => branches,
                    Err(e) => return Ok(vec![Decision::fail(format!("{e:#}"), &step.step_key)]),
                };
                let total = branches.len() as i32;
                *workflow_state = WorkflowState {
                    current_step_number: step_number,
                    number_of_actions: total,
                    ..Default::default()
                };
                for (i, branch) in branches.into_iter().enumerate() {
                    let state = SchedulableState::new(step_number, &step.step_key, i as i32, total)
                        .with_attempt(attempt_number)
                        .with_max_attempts(branch.member.options.max_attempts)
                        .with_delay(branch.delay_seconds);
                    decisions.extend(self.schedule_activity(
                        state,
                        &branch.input,
                        &branch.member,
                        None,
                        now,
                    )?);
                }
            }
            Action::WorkflowCollection(collection) => {
                let branches = match collection.fan_out(input) {
                    Ok(branches) => branches,
                    Err(e) => return Ok(vec![Decision::fail(format!("{e:#}"), &step.step_key)]),
                };
                let total = branches.len() as i32;
                *workflow_state = WorkflowState {
                    current_step_number: step_number,
                    number_of_actions: total,
                    ..Default::default()
                };
                for (i, branch) in branches.into_iter().enumerate() {
                    let state = SchedulableState::new(step_number, &step.step_key, i as i32, total)
                        .with_attempt(attempt_number)
                        .with_max_attempts(branch.member.options().max_attempts)
                        .with_delay(branch.delay_seconds);
                    decisions.extend(self.schedule_child_workflow(
                        state,
                        &branch.input,
                        &branch.member,
                    )?);
                }
            }
            action => {
                *workflow_state = WorkflowState::new(step_number);
                let state = SchedulableState::new(step_number, &step.step_key, 0, 1)
                    .with_attempt(attempt_number)
                    .with_max_attempts(max_attempts_of(action))
                    .with_delay(delay_of(action));
                decisions.extend(self.schedule_state(state, input, now)?);
            }
        }

        debug!(
            workflow = %self.name(),
            step_number,
            count = decisions.len(),
            "scheduled step"
        );
        Ok(decisions)
    }

    /// Schedule the single action addressed by `state`
    ///
    /// Collections schedule one more copy of their member. Used for retries,
    /// fired timers and suspended activities.
    pub(crate) fn schedule_state(
        &self,
        state: SchedulableState,
        input: &str,
        now: DateTime<Utc>,
    ) -> Result<StepDecision, DeciderError> {
        let step = self
            .get_step(state.step_number)
            .ok_or(DeciderError::StepNotFound(state.step_number))?;

        match &step.action {
            Action::Activity(activity) => self.schedule_activity(state, input, activity, None, now),
            Action::Suspendable(suspendable) => self.schedule_activity(
                state,
                input,
                &suspendable.activity,
                Some(suspendable.waiting_time_seconds),
                now,
            ),
            Action::ActivityCollection(collection) => {
                self.schedule_activity(state, input, &collection.member, None, now)
            }
            Action::ChildWorkflow(child) => self.schedule_child_workflow(state, input, child),
            Action::WorkflowCollection(collection) => {
                self.schedule_child_workflow(state, input, &collection.member)
            }
        }
    }

    /// Schedule one activity, or a delay timer for it
    ///
    /// With `waiting_time_seconds` set the activity is suspendable: past the
    /// deadline measured from its first scheduling, the workflow fails instead.
    pub fn schedule_activity(
        &self,
        mut state: SchedulableState,
        input: &str,
        activity: &Activity,
        waiting_time_seconds: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<StepDecision, DeciderError> {
        let activity_id = create_action_id(
            &activity.name,
            self.tree_path(),
            state.step_number,
            state.action_number,
            state.attempt_number,
        );

        if let Some(waiting_time) = waiting_time_seconds {
            if let Some(elapsed) = state.elapsed_seconds(now) {
                if elapsed > waiting_time {
                    warn!(%activity_id, elapsed, waiting_time, "suspendable activity expired");
                    return Ok(vec![Decision::fail(SUSPEND_EXPIRED, activity_id)]);
                }
            }
            state.mark_started(now);
        }

        let control = state.encode()?;
        if state.delay_seconds > 0 {
            return Ok(delayed(activity_id, state.delay_seconds, control, input));
        }

        let options = self.options();
        let activity_options = &activity.options;
        Ok(vec![Decision::ScheduleActivityTask(ScheduleActivityTask {
            activity_type: TypeRef::new(
                &activity.name,
                create_activity_version(
                    state.step_number,
                    &options.name,
                    &options.version,
                    activity_options.version.as_deref(),
                ),
            ),
            activity_id,
            task_list: activity_options
                .task_list
                .clone()
                .unwrap_or_else(|| options.task_list.clone()),
            input: input.to_string(),
            control,
            schedule_to_close_timeout: timeout_to_string(activity_options.schedule_to_close_timeout),
            schedule_to_start_timeout: timeout_to_string(activity_options.schedule_to_start_timeout),
            start_to_close_timeout: timeout_to_string(activity_options.start_to_close_timeout),
            heartbeat_timeout: timeout_to_string(activity_options.heartbeat_timeout),
        })])
    }

    /// Start one child workflow, or a delay timer for it
    pub fn schedule_child_workflow(
        &self,
        state: SchedulableState,
        input: &str,
        child: &Workflow,
    ) -> Result<StepDecision, DeciderError> {
        let child_options = child.options();
        let control = state.encode()?;

        if state.delay_seconds > 0 {
            let timer_id = create_action_id(
                &child_options.name,
                child.tree_path(),
                state.step_number,
                state.action_number,
                state.attempt_number,
            );
            return Ok(delayed(timer_id, state.delay_seconds, control, input));
        }

        Ok(vec![Decision::StartChildWorkflowExecution(
            StartChildWorkflowExecution {
                workflow_id: create_workflow_id(
                    &child_options.name,
                    child.tree_path(),
                    state.step_number,
                    state.action_number,
                    state.attempt_number,
                ),
                workflow_type: TypeRef::new(&child_options.name, &child_options.version),
                task_list: child_options.task_list.clone(),
                input: input.to_string(),
                control,
                execution_start_to_close_timeout: timeout_to_string(
                    child_options.execution_start_to_close_timeout,
                ),
                task_start_to_close_timeout: timeout_to_string(
                    child_options.task_start_to_close_timeout,
                ),
            },
        )])
    }
}

/// Timer plus the marker that keeps the input until it fires
fn delayed(timer_id: String, delay_seconds: i32, control: String, input: &str) -> StepDecision {
    vec![
        Decision::StartTimer(StartTimer {
            timer_id: timer_id.clone(),
            start_to_fire_timeout: delay_seconds.to_string(),
            control,
        }),
        Decision::RecordMarker(RecordMarker {
            marker_name: timer_id,
            details: input.to_string(),
        }),
    ]
}

/// Configured attempts of a single action
pub(crate) fn max_attempts_of(action: &Action) -> i32 {
    match action {
        Action::Activity(a) => a.options.max_attempts,
        Action::Suspendable(s) => s.activity.options.max_attempts,
        Action::ActivityCollection(c) => c.member.options.max_attempts,
        Action::ChildWorkflow(w) => w.options().max_attempts,
        Action::WorkflowCollection(c) => c.member.options().max_attempts,
    }
}

/// Configured scheduling delay of a single action
pub(crate) fn delay_of(action: &Action) -> i32 {
    match action {
        Action::Activity(a) => a.options.delay_seconds,
        Action::Suspendable(s) => s.activity.options.delay_seconds,
        Action::ActivityCollection(c) => c.member.options.delay_seconds,
        Action::ChildWorkflow(w) => w.options().delay_seconds,
        Action::WorkflowCollection(c) => c.member.options().delay_seconds,
    }
}
