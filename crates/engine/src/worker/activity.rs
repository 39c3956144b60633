//! Activity task polling and execution

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use super::{PollOutcome, PollingWorker, WorkerError};
use crate::config::WorkerConfig;
use crate::platform::{ActivityTask, OrchestrationPlatform};
use crate::storage::{BlobStore, PayloadStore};
use crate::workflow::{Activity, StepResult, Workflow};

enum ActivitySource {
    /// Look the activity up by the task's activity id
    Tree(Arc<Workflow>),
    /// Run this activity for every task
    Standalone(Activity),
}

/// Polls activity tasks and runs the matching activity body
pub struct ActivityWorker<P: OrchestrationPlatform + ?Sized> {
    platform: Arc<P>,
    source: ActivitySource,
    payloads: PayloadStore,
    config: WorkerConfig,
}

impl<P: OrchestrationPlatform + ?Sized> ActivityWorker<P> {
    /// Serve every activity of a step tree, nested children included
    pub fn new(platform: Arc<P>, workflow: Arc<Workflow>, config: WorkerConfig) -> Self {
        Self {
            platform,
            source: ActivitySource::Tree(workflow),
            payloads: PayloadStore::disabled(),
            config,
        }
    }

    /// Serve a single activity regardless of the task's activity id
    pub fn standalone(platform: Arc<P>, activity: Activity, config: WorkerConfig) -> Self {
        Self {
            platform,
            source: ActivitySource::Standalone(activity),
            payloads: PayloadStore::disabled(),
            config,
        }
    }

    /// Hydrate inputs from and offload results to `store`
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.payloads = PayloadStore::new(store, self.config.payload_threshold);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn resolve(&self, activity_id: &str) -> Option<&Activity> {
        match &self.source {
            ActivitySource::Tree(workflow) => workflow.find_activity(activity_id),
            ActivitySource::Standalone(activity) => Some(activity),
        }
    }

    /// Run one activity task and report its outcome
    #[instrument(skip(self, task), fields(activity_id = %task.activity_id))]
    pub async fn handle(&self, task: ActivityTask) -> Result<(), WorkerError> {
        let Some(activity) = self.resolve(&task.activity_id) else {
            warn!("activity not found");
            let result =
                StepResult::failure(format!("Activity '{}' not found.", task.activity_id))
                    .to_json()?;
            self.platform
                .respond_activity_task_completed(&task.task_token, result)
                .await?;
            return Ok(());
        };

        let input = self
            .payloads
            .hydrate(task.input.as_deref().unwrap_or_default())
            .await?;

        match activity.process(&input).await {
            Ok(output) => {
                let result = self.payloads.offload(&output).await?;
                debug!(activity = %activity.name, "activity completed");
                self.platform
                    .respond_activity_task_completed(&task.task_token, result)
                    .await?;
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(activity = %activity.name, error = %reason, "activity failed");
                let details = StepResult::failure(reason.clone()).to_json()?;
                self.platform
                    .respond_activity_task_failed(&task.task_token, reason, details)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<P: OrchestrationPlatform + ?Sized> PollingWorker for ActivityWorker<P> {
    fn kind(&self) -> &'static str {
        "activity"
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn run_once(&self) -> Result<PollOutcome, WorkerError> {
        let request = self.config.poll_request();
        match self.platform.poll_for_activity_task(&request).await? {
            Some(task) => {
                self.handle(task).await?;
                Ok(PollOutcome::Processed)
            }
            None => {
                trace!(task_list = %request.task_list, "no activity task");
                Ok(PollOutcome::Idle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ActivityOutcome, InMemoryPlatform};
    use crate::storage::InMemoryBlobStore;
    use crate::workflow::ids::create_action_id;
    use crate::workflow::{Action, WorkflowOptions};
    use serde_json::{json, Value};

    fn double() -> Activity {
        Activity::new("double").with_handler(|input: Value| async move {
            let n = input.as_i64().unwrap_or_default();
            Ok(StepResult::success(json!(n * 2)))
        })
    }

    fn broken() -> Activity {
        Activity::new("broken")
            .with_handler(|_| async { Err(anyhow::anyhow!("card declined")) })
    }

    fn workflow() -> Arc<Workflow> {
        Arc::new(
            Workflow::new(WorkflowOptions::new("math", "tl"))
                .with_step("double", Action::Activity(double()))
                .unwrap()
                .with_step("broken", Action::Activity(broken()))
                .unwrap(),
        )
    }

    fn task(activity_id: String, input: &str) -> ActivityTask {
        ActivityTask {
            task_token: "a-1".into(),
            activity_id,
            input: Some(input.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_activity_completes() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.push_activity_task(task(create_action_id("double", "", 0, 0, 0), "21"));
        let worker = ActivityWorker::new(platform.clone(), workflow(), WorkerConfig::default());

        let outcome = tokio_test::assert_ok!(worker.run_once().await);
        assert_eq!(outcome, PollOutcome::Processed);

        match &platform.activity_outcomes()[0] {
            ActivityOutcome::Completed { task_token, result } => {
                assert_eq!(task_token, "a-1");
                let parsed = StepResult::parse(result);
                assert!(parsed.success);
                assert_eq!(parsed.return_value, "42");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activity_error_responds_failed() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.push_activity_task(task(create_action_id("broken", "", 1, 0, 0), ""));
        let worker = ActivityWorker::new(platform.clone(), workflow(), WorkerConfig::default());

        worker.run_once().await.unwrap();

        match &platform.activity_outcomes()[0] {
            ActivityOutcome::Failed {
                reason, details, ..
            } => {
                assert_eq!(reason, "card declined");
                let parsed = StepResult::parse(details);
                assert!(!parsed.success);
                assert_eq!(parsed.return_value, "card declined");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_activity_completes_with_failure() {
        let platform = Arc::new(InMemoryPlatform::new());
        let id = create_action_id("missing", "", 7, 0, 0);
        platform.push_activity_task(task(id.clone(), ""));
        let worker = ActivityWorker::new(platform.clone(), workflow(), WorkerConfig::default());

        worker.run_once().await.unwrap();

        match &platform.activity_outcomes()[0] {
            ActivityOutcome::Completed { result, .. } => {
                let parsed = StepResult::parse(result);
                assert!(!parsed.success);
                assert_eq!(parsed.return_value, format!("Activity '{id}' not found."));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_standalone_ignores_activity_id() {
        let platform = Arc::new(InMemoryPlatform::new());
        platform.push_activity_task(task("anything".into(), "5"));
        let worker =
            ActivityWorker::standalone(platform.clone(), double(), WorkerConfig::default());

        worker.run_once().await.unwrap();

        assert!(matches!(
            &platform.activity_outcomes()[0],
            ActivityOutcome::Completed { result, .. } if StepResult::parse(result).return_value == "10"
        ));
    }

    #[tokio::test]
    async fn test_payloads_round_trip_through_blob_store() {
        let platform = Arc::new(InMemoryPlatform::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let payloads = PayloadStore::new(blobs.clone(), 8);
        let input = payloads.offload("123456789").await.unwrap();
        platform.push_activity_task(task(create_action_id("double", "", 0, 0, 0), &input));

        let worker = ActivityWorker::new(
            platform.clone(),
            workflow(),
            WorkerConfig::default().with_payload_threshold(8),
        )
        .with_blob_store(blobs.clone());
        worker.run_once().await.unwrap();

        match &platform.activity_outcomes()[0] {
            ActivityOutcome::Completed { result, .. } => {
                assert!(PayloadStore::is_reference(result));
                let raw = payloads.hydrate(result).await.unwrap();
                assert_eq!(StepResult::parse(&raw).return_value, "246913578");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(blobs.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_poll() {
        let platform = Arc::new(InMemoryPlatform::new());
        let worker = ActivityWorker::new(platform, workflow(), WorkerConfig::default());
        assert_eq!(worker.run_once().await.unwrap(), PollOutcome::Idle);
    }
}
