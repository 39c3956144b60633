//! Decision task polling

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use super::{PollOutcome, PollingWorker, WorkerError};
use crate::config::WorkerConfig;
use crate::decider::WorkflowEventsProcessor;
use crate::platform::OrchestrationPlatform;
use crate::storage::{BlobStore, PayloadStore};
use crate::workflow::Workflow;

/// Polls decision tasks for one step tree and answers them
pub struct DecisionWorker<P: OrchestrationPlatform + ?Sized> {
    platform: Arc<P>,
    processor: WorkflowEventsProcessor<P>,
    config: WorkerConfig,
}

impl<P: OrchestrationPlatform + ?Sized> DecisionWorker<P> {
    pub fn new(platform: Arc<P>, workflow: Arc<Workflow>, config: WorkerConfig) -> Self {
        let processor = WorkflowEventsProcessor::new(Arc::clone(&platform), workflow)
            .with_domain(config.domain.clone())
            .with_history_retry(config.history_retry.clone());
        Self {
            platform,
            processor,
            config,
        }
    }

    /// Offload payloads above the configured threshold to `store`
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        let payloads = PayloadStore::new(store, self.config.payload_threshold);
        self.processor = self.processor.with_payload_store(payloads);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

#[async_trait]
impl<P: OrchestrationPlatform + ?Sized> PollingWorker for DecisionWorker<P> {
    fn kind(&self) -> &'static str {
        "decision"
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    #[instrument(skip(self), fields(task_list = %self.config.task_list))]
    async fn run_once(&self) -> Result<PollOutcome, WorkerError> {
        let request = self.config.poll_request();
        let Some(task) = self.platform.poll_for_decision_task(&request).await? else {
            trace!("no decision task");
            return Ok(PollOutcome::Idle);
        };

        let workflow_id = task.workflow_execution.workflow_id.clone();
        let response = self.processor.decide(task).await?;
        debug!(
            %workflow_id,
            decisions = response.decisions.len(),
            "responding to decision task"
        );
        self.platform.respond_decision_task_completed(response).await?;
        Ok(PollOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decider::Decision;
    use crate::history::{
        EventAttributes, HistoryEvent, TypeRef, WorkflowExecution,
        WorkflowExecutionStartedAttributes,
    };
    use crate::platform::{DecisionTask, InMemoryPlatform};
    use crate::storage::InMemoryBlobStore;
    use crate::workflow::{Action, Activity, WorkflowOptions};

    fn workflow() -> Arc<Workflow> {
        Arc::new(
            Workflow::new(WorkflowOptions::new("orders", "tl"))
                .with_step("charge", Action::Activity(Activity::new("charge")))
                .unwrap(),
        )
    }

    fn start_task(input: &str) -> DecisionTask {
        DecisionTask {
            task_token: "t-1".into(),
            workflow_execution: WorkflowExecution::new("orders-1", "run-1"),
            workflow_type: TypeRef::new("orders", "1.0"),
            events: vec![HistoryEvent::new(
                1,
                EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
                    input: Some(input.to_string()),
                    ..Default::default()
                }),
            )],
            next_page_token: None,
        }
    }

    #[tokio::test]
    async fn test_idle_poll() {
        let platform = Arc::new(InMemoryPlatform::new());
        let worker = DecisionWorker::new(platform, workflow(), WorkerConfig::default());
        assert_eq!(worker.run_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_decision_task_is_answered() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.push_decision_task(start_task("order-42"));
        let worker = DecisionWorker::new(platform.clone(), workflow(), WorkerConfig::default());

        assert_eq!(worker.run_once().await.unwrap(), PollOutcome::Processed);

        let responses = platform.decision_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].task_token, "t-1");
        match &responses[0].decisions[0] {
            Decision::ScheduleActivityTask(schedule) => {
                assert_eq!(schedule.input, "order-42");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        assert!(platform.execution_context("orders-1").is_some());
    }

    #[tokio::test]
    async fn test_large_input_is_offloaded() {
        let platform = Arc::new(InMemoryPlatform::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let big = "x".repeat(64);
        platform.push_decision_task(start_task(&big));

        let worker = DecisionWorker::new(
            platform.clone(),
            workflow(),
            WorkerConfig::default().with_payload_threshold(16),
        )
        .with_blob_store(blobs.clone());
        worker.run_once().await.unwrap();

        let responses = platform.decision_responses();
        match &responses[0].decisions[0] {
            Decision::ScheduleActivityTask(schedule) => {
                assert!(PayloadStore::is_reference(&schedule.input));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        assert_eq!(blobs.len(), 1);
    }
}
