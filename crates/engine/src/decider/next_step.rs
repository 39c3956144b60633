//! Advancing, rerouting and retrying after an action finishes

use chrono::Utc;
use tracing::{debug, info, warn};

use super::decision::{Decision, StepDecision, STATE_UNDEFINED};
use super::scheduler::delay_of;
use super::DeciderError;
use crate::context::DecisionContext;
use crate::state::WorkflowState;
use crate::workflow::{Step, StepResult, Workflow};

impl Workflow {
    /// Input and number of the step to run after `step`
    ///
    /// The custom next-step handler, when installed, may redirect to another
    /// step by key. Anything else (no handler, handler error, unsuccessful
    /// result, unknown key) keeps `input` and `default_next`.
    pub fn resolve_step_number(
        &self,
        step: &Step,
        input: &str,
        default_next: i32,
    ) -> (String, i32) {
        self.route(step, input)
            .unwrap_or_else(|| (input.to_string(), default_next))
    }

    fn route(&self, step: &Step, input: &str) -> Option<(String, i32)> {
        let handler = self.options().next_step_handler.as_ref()?;

        let routed = match handler(&step.step_key, input) {
            Ok(routed) => routed,
            Err(e) => {
                warn!(step_key = %step.step_key, error = %e, "next step handler failed");
                return None;
            }
        };
        if !routed.success {
            return None;
        }

        let key = routed.step_key.as_deref()?;
        match self.find_step(key) {
            Some(target) => {
                debug!(from = %step.step_key, to = %key, "rerouted");
                Some((routed.return_value, target.step_number))
            }
            None => {
                warn!(step_key = %key, "next step handler named an unknown step");
                None
            }
        }
    }

    /// React to a completed activity or child workflow
    pub fn next_step(
        &self,
        context: &DecisionContext,
        workflow_state: &mut WorkflowState,
    ) -> Result<StepDecision, DeciderError> {
        let Some(state) = context.schedulable_state()? else {
            return Ok(vec![Decision::fail(
                STATE_UNDEFINED,
                context.result.clone().unwrap_or_default(),
            )]);
        };

        let Some(step) = self.get_step(state.step_number) else {
            return Ok(vec![Decision::complete(
                context.result.clone().unwrap_or_default(),
            )]);
        };

        if let Some(result_ref) = &context.result_ref {
            workflow_state.record_result(state.action_number, result_ref.clone());
        }

        if let Some(collection) = step.action.as_parallel_collection() {
            let results = context.step_results(state.step_number);
            let recorded = results.map(|r| r.len()).unwrap_or_default();
            if (recorded as i32) < state.total_actions {
                debug!(
                    step_number = state.step_number,
                    recorded,
                    total = state.total_actions,
                    "waiting for remaining branches"
                );
                return Ok(Vec::new());
            }

            let outputs = results
                .into_iter()
                .flat_map(|r| r.values())
                .map(|raw| StepResult::parse(raw).return_value)
                .collect();
            let reduced = collection.reduce(outputs)?;
            let (input, next) = self.resolve_step_number(step, &reduced, step.step_number + 1);
            return self.schedule_step(workflow_state, next, &input, 0);
        }

        let result = context.result_object();

        if let Some(suspendable) = step.action.as_suspendable() {
            if result.success {
                return self.advance(workflow_state, step, &result.return_value);
            }
            debug!(step_key = %step.step_key, "suspendable activity not ready, waiting again");
            let state = state
                .with_attempt(0)
                .with_delay(suspendable.activity.options.delay_seconds);
            return self.schedule_activity(
                state,
                context.input.as_deref().unwrap_or_default(),
                &suspendable.activity,
                Some(suspendable.waiting_time_seconds),
                Utc::now(),
            );
        }

        if result.success {
            return self.advance(workflow_state, step, &result.return_value);
        }

        let raw = context.result.as_deref().unwrap_or_default();
        if let Some((input, next)) = self.route(step, raw) {
            return self.schedule_step(workflow_state, next, &input, 0);
        }

        let action_id = context
            .activity_id
            .clone()
            .or_else(|| context.child_workflow_id.clone())
            .unwrap_or_default();
        info!(%action_id, step_key = %step.step_key, "step failed");
        Ok(vec![Decision::fail(result.return_value, action_id)])
    }

    fn advance(
        &self,
        workflow_state: &mut WorkflowState,
        step: &Step,
        output: &str,
    ) -> Result<StepDecision, DeciderError> {
        let (input, next) = self.resolve_step_number(step, output, step.step_number + 1);
        self.schedule_step(workflow_state, next, &input, 0)
    }

    /// Retry the triggering action after a platform-level failure
    ///
    /// Retries while the next attempt stays below the action's maximum,
    /// otherwise fails the workflow with `reason` and `details`.
    pub fn retry_or_fail(
        &self,
        context: &DecisionContext,
        reason: &str,
        details: &str,
    ) -> Result<StepDecision, DeciderError> {
        let Some(state) = context.schedulable_state()? else {
            return Ok(vec![Decision::fail(STATE_UNDEFINED, details)]);
        };

        let next_attempt = state.attempt_number + 1;
        if next_attempt >= state.max_attempts {
            info!(
                step_number = state.step_number,
                attempts = next_attempt,
                %reason,
                "attempts exhausted"
            );
            return Ok(vec![Decision::fail(reason, details)]);
        }

        let step = self
            .get_step(state.step_number)
            .ok_or(DeciderError::StepNotFound(state.step_number))?;
        let retry = state
            .with_attempt(next_attempt)
            .with_delay(delay_of(&step.action));
        info!(
            step_number = retry.step_number,
            action_number = retry.action_number,
            attempt = next_attempt,
            "retrying action"
        );
        self.schedule_state(
            retry,
            context.input.as_deref().unwrap_or_default(),
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SchedulableState;
    use crate::workflow::{
        Action, Activity, ActivityOptions, CollectionItem, ParallelCollection,
        SuspendableActivity, WorkflowOptions,
    };
    use std::collections::BTreeMap;

    fn success(value: &str) -> String {
        StepResult::success(value.to_string()).to_json().unwrap()
    }

    fn failure(value: &str) -> String {
        StepResult::failure(value.to_string()).to_json().unwrap()
    }

    fn completed(state: &SchedulableState, result: String) -> DecisionContext {
        let mut context = DecisionContext::new();
        context.control = Some(state.encode().unwrap());
        context.activity_id = Some("__a._0._0._0".into());
        context.input = Some("step-in".into());
        context.set_result(Some(result));
        context.add_result(context.result_ref.clone().as_deref());
        context
    }

    fn linear() -> Workflow {
        Workflow::new(WorkflowOptions::new("orders", "tl"))
            .with_step("validate", Action::Activity(Activity::new("validate")))
            .unwrap()
            .with_step("charge", Action::Activity(Activity::new("charge")))
            .unwrap()
            .with_step("refund", Action::Activity(Activity::new("refund")))
            .unwrap()
    }

    fn scheduled_input(decision: &Decision) -> (String, SchedulableState) {
        let Decision::ScheduleActivityTask(task) = decision else {
            panic!("expected activity task, got {decision:?}");
        };
        let state = SchedulableState::decode(Some(&task.control)).unwrap().unwrap();
        (task.input.clone(), state)
    }

    #[test]
    fn test_success_schedules_next_step_with_attempt_reset() {
        let workflow = linear();
        let state = SchedulableState::new(0, "validate", 0, 1)
            .with_attempt(2)
            .with_max_attempts(3);
        let context = completed(&state, success("ok"));
        let mut workflow_state = WorkflowState::new(0);

        let decisions = workflow.next_step(&context, &mut workflow_state).unwrap();
        assert_eq!(decisions.len(), 1);
        let (input, next) = scheduled_input(&decisions[0]);
        assert_eq!(input, "ok");
        assert_eq!(next.step_number, 1);
        assert_eq!(next.attempt_number, 0);
        assert_eq!(workflow_state.current_step_number, 1);
    }

    #[test]
    fn test_last_step_completes_workflow() {
        let workflow = linear();
        let state = SchedulableState::new(2, "refund", 0, 1);
        let context = completed(&state, success("done"));

        let decisions = workflow
            .next_step(&context, &mut WorkflowState::new(2))
            .unwrap();
        assert_eq!(decisions, vec![Decision::complete("done")]);
    }

    #[test]
    fn test_missing_control_fails() {
        let mut context = DecisionContext::new();
        context.set_result(Some("r".into()));

        let decisions = linear()
            .next_step(&context, &mut WorkflowState::default())
            .unwrap();
        assert_eq!(decisions, vec![Decision::fail(STATE_UNDEFINED, "r")]);
    }

    #[test]
    fn test_failure_without_handler_fails_with_action_id() {
        let state = SchedulableState::new(0, "validate", 0, 1);
        let context = completed(&state, failure("invalid order"));

        let decisions = linear()
            .next_step(&context, &mut WorkflowState::new(0))
            .unwrap();
        assert_eq!(
            decisions,
            vec![Decision::fail("invalid order", "__a._0._0._0")]
        );
    }

    #[test]
    fn test_handler_reroutes_success_and_failure() {
        let options = WorkflowOptions::new("orders", "tl").with_next_step_handler(
            |step_key: &str, input: &str| {
                if step_key == "validate" && input.contains("\"success\":false") {
                    Ok(StepResult::success("refund-input".to_string()).with_step_key("refund"))
                } else {
                    Ok(StepResult::failure(input.to_string()))
                }
            },
        );
        let workflow = Workflow::new(options)
            .with_step("validate", Action::Activity(Activity::new("validate")))
            .unwrap()
            .with_step("charge", Action::Activity(Activity::new("charge")))
            .unwrap()
            .with_step("refund", Action::Activity(Activity::new("refund")))
            .unwrap();
        let state = SchedulableState::new(0, "validate", 0, 1);

        let rerouted = workflow
            .next_step(&completed(&state, failure("bad")), &mut WorkflowState::new(0))
            .unwrap();
        let (input, next) = scheduled_input(&rerouted[0]);
        assert_eq!(input, "refund-input");
        assert_eq!(next.step_number, 2);

        let linear = workflow
            .next_step(&completed(&state, success("fine")), &mut WorkflowState::new(0))
            .unwrap();
        assert_eq!(scheduled_input(&linear[0]).1.step_number, 1);
    }

    #[test]
    fn test_handler_unknown_step_falls_back() {
        let options = WorkflowOptions::new("w", "tl").with_next_step_handler(|_: &str, _: &str| {
            Ok(StepResult::success("x".to_string()).with_step_key("nowhere"))
        });
        let workflow = Workflow::new(options)
            .with_step("only", Action::Activity(Activity::new("only")))
            .unwrap();
        let step = workflow.get_step(0).unwrap();

        assert_eq!(
            workflow.resolve_step_number(step, "in", 1),
            ("in".to_string(), 1)
        );
    }

    fn collection_workflow() -> Workflow {
        let collection = ParallelCollection::new(
            Activity::new("branch"),
            |input: &str| Ok(input.split(',').map(CollectionItem::new).collect()),
            |outputs| Ok(outputs.join("+")),
        );
        Workflow::new(WorkflowOptions::new("fan", "tl"))
            .with_step("split", Action::ActivityCollection(collection))
            .unwrap()
            .with_step("after", Action::Activity(Activity::new("after")))
            .unwrap()
    }

    #[test]
    fn test_fan_in_waits_for_all_branches() {
        let workflow = collection_workflow();
        let state = SchedulableState::new(0, "split", 1, 3);
        let mut context = completed(&state, success("b"));
        context.results.insert(0, BTreeMap::from([(1, success("b"))]));

        let decisions = workflow
            .next_step(&context, &mut WorkflowState::new(0))
            .unwrap();
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_fan_in_reduces_in_action_order() {
        let workflow = collection_workflow();
        let state = SchedulableState::new(0, "split", 0, 3);
        let mut context = completed(&state, success("a"));
        context.results.insert(
            0,
            BTreeMap::from([(2, success("c")), (0, success("a")), (1, success("b"))]),
        );

        let decisions = workflow
            .next_step(&context, &mut WorkflowState::new(0))
            .unwrap();
        let (input, next) = scheduled_input(&decisions[0]);
        assert_eq!(input, "a+b+c");
        assert_eq!(next.step_number, 1);
    }

    #[test]
    fn test_suspendable_failure_waits_again() {
        let activity = Activity::new("approval").with_options(ActivityOptions::new().with_delay(60));
        let workflow = Workflow::new(WorkflowOptions::new("w", "tl"))
            .with_step(
                "approve",
                Action::Suspendable(SuspendableActivity::new(activity, 3600)),
            )
            .unwrap();
        let state = SchedulableState::new(0, "approve", 0, 1).with_attempt(2);
        let context = completed(&state, failure("not yet"));

        let decisions = workflow
            .next_step(&context, &mut WorkflowState::new(0))
            .unwrap();
        let Decision::StartTimer(timer) = &decisions[0] else {
            panic!("expected timer, got {decisions:?}");
        };
        let control = SchedulableState::decode(Some(&timer.control)).unwrap().unwrap();
        assert_eq!(control.attempt_number, 0);
        assert_eq!(control.delay_seconds, 60);
        assert!(control.started_at.is_some());
    }

    #[test]
    fn test_retry_until_max_attempts() {
        let workflow = linear();
        let first = SchedulableState::new(1, "charge", 0, 1).with_max_attempts(3);
        let mut context = completed(&first, String::new());
        context.input = Some("charge-in".into());

        let decisions = workflow.retry_or_fail(&context, "boom", "trace").unwrap();
        let (input, retry) = scheduled_input(&decisions[0]);
        assert_eq!(input, "charge-in");
        assert_eq!(retry.attempt_number, 1);

        let last = first.with_attempt(2);
        context.control = Some(last.encode().unwrap());
        let decisions = workflow.retry_or_fail(&context, "boom", "trace").unwrap();
        assert_eq!(decisions, vec![Decision::fail("boom", "trace")]);
    }
}
