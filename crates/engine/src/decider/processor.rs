//! One full decision cycle: replay, decide, respond

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::dispatch::{make_decision, Decider};
use super::{Decision, DeciderError};
use crate::context::{process_event, DecisionContext};
use crate::history::HistoryIterator;
use crate::platform::{DecisionTask, OrchestrationPlatform, RespondDecision};
use crate::reliability::RetryPolicy;
use crate::state::WorkflowState;
use crate::storage::{PayloadStore, StorageError};
use crate::workflow::Workflow;

/// Turns decision tasks into decision responses for one step tree
///
/// The decider for a task is resolved from the task's workflow id, so one
/// processor serves the root workflow and every nested child.
pub struct WorkflowEventsProcessor<P: OrchestrationPlatform + ?Sized> {
    platform: Arc<P>,
    workflow: Arc<Workflow>,
    payloads: PayloadStore,
    domain: String,
    history_retry: RetryPolicy,
}

impl<P: OrchestrationPlatform + ?Sized> WorkflowEventsProcessor<P> {
    pub fn new(platform: Arc<P>, workflow: Arc<Workflow>) -> Self {
        let domain = workflow.options().domain.clone();
        Self {
            platform,
            workflow,
            payloads: PayloadStore::disabled(),
            domain,
            history_retry: RetryPolicy::history_fetch(),
        }
    }

    /// Offload and hydrate payloads through `payloads`
    pub fn with_payload_store(mut self, payloads: PayloadStore) -> Self {
        self.payloads = payloads;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Retry policy for history page fetches
    pub fn with_history_retry(mut self, retry: RetryPolicy) -> Self {
        self.history_retry = retry;
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Replay the task's full history into a context
    ///
    /// Payload references are left as recorded; see [`hydrate`](Self::hydrate).
    pub async fn build_context(&self, task: &mut DecisionTask) -> DecisionContext {
        let mut context = DecisionContext {
            workflow_name: Some(task.workflow_type.name.clone()),
            workflow_version: Some(task.workflow_type.version.clone()),
            workflow_id: Some(task.workflow_execution.workflow_id.clone()),
            run_id: Some(task.workflow_execution.run_id.clone()),
            ..Default::default()
        };

        match self
            .platform
            .describe_execution(&self.domain, &task.workflow_execution)
            .await
        {
            Ok(description) => {
                context.last_execution_context =
                    WorkflowState::decode(description.latest_execution_context.as_deref())
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "undecodable latest execution context");
                            None
                        });
            }
            Err(e) => warn!(error = %e, "describe execution failed"),
        }

        let mut history = HistoryIterator::new(
            self.platform.as_ref(),
            task.first_page(),
            self.history_retry.clone(),
        );
        while let Some(event) = history.next_event().await {
            process_event(&mut context, &event, history.buffered());
        }
        debug!(
            events = history.buffered().len(),
            decision_type = ?context.decision_type,
            "replayed history"
        );

        context
    }

    /// Resolve payload references the deciders read
    ///
    /// Covers the triggering input and result, every marker, and the results
    /// of the triggering step.
    pub async fn hydrate(&self, context: &mut DecisionContext) -> Result<(), StorageError> {
        context.input = self.payloads.hydrate_opt(context.input_ref.as_deref()).await?;
        context.result = self.payloads.hydrate_opt(context.result_ref.as_deref()).await?;

        for value in context.markers.values_mut() {
            *value = self.payloads.hydrate(value).await?;
        }

        if let Ok(Some(state)) = context.schedulable_state() {
            if let Some(results) = context.results.get_mut(&state.step_number) {
                for value in results.values_mut() {
                    *value = self.payloads.hydrate(value).await?;
                }
            }
        }
        Ok(())
    }

    /// Decide a task and build the response
    #[instrument(
        skip(self, task),
        fields(workflow_id = %task.workflow_execution.workflow_id)
    )]
    pub async fn decide(&self, mut task: DecisionTask) -> Result<RespondDecision, DeciderError> {
        let mut context = self.build_context(&mut task).await;
        let references = context.payload_references();
        self.hydrate(&mut context).await?;

        let mut state = context
            .last_execution_context
            .clone()
            .or_else(|| context.execution_context.clone())
            .unwrap_or_default();

        let workflow_id = context.workflow_id.clone().unwrap_or_default();
        let decider = self
            .workflow
            .get_decider(&workflow_id)
            .map(|w| w as &dyn Decider);
        let mut decisions = make_decision(decider, &context, &mut state)?;

        for decision in &mut decisions {
            if let Some(payload) = decision.payload_mut() {
                *payload = self.payloads.offload(payload).await?;
            }
        }

        if decisions.iter().any(Decision::is_terminal) {
            let deleted = self
                .payloads
                .delete_all(references.iter().map(String::as_str))
                .await;
            info!(%workflow_id, deleted, "workflow closed, payloads cleaned up");
        }

        debug!(
            count = decisions.len(),
            kinds = ?decisions.iter().map(Decision::kind).collect::<Vec<_>>(),
            "decided"
        );

        Ok(RespondDecision {
            task_token: task.task_token,
            decisions,
            execution_context: Some(state.encode()?),
        })
    }
}
