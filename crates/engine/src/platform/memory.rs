//! Scripted in-memory platform

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::*;

/// Outcome reported for an activity task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityOutcome {
    Completed {
        task_token: String,
        result: String,
    },
    Failed {
        task_token: String,
        reason: String,
        details: String,
    },
}

/// Platform fake fed with prepared tasks
///
/// Tasks are handed out in the order they were pushed; every response is
/// recorded for inspection. Decision responses also update the stored
/// execution context returned by `describe_execution`.
///
/// # Example
///
/// ```
/// use stepflow_engine::platform::{DecisionTask, InMemoryPlatform};
///
/// let platform = InMemoryPlatform::new();
/// platform.push_decision_task(DecisionTask::default());
/// assert_eq!(platform.pending_decision_tasks(), 1);
/// ```
#[derive(Default)]
pub struct InMemoryPlatform {
    decision_tasks: Mutex<VecDeque<DecisionTask>>,
    activity_tasks: Mutex<VecDeque<ActivityTask>>,
    pages: RwLock<HashMap<String, HistoryPage>>,
    page_failures: Mutex<HashMap<String, u32>>,
    page_requests: AtomicU32,
    /// task token -> workflow id, for decision tasks handed out
    task_executions: Mutex<HashMap<String, String>>,
    /// workflow id -> latest execution context
    contexts: RwLock<HashMap<String, String>>,
    decision_responses: Mutex<Vec<RespondDecision>>,
    activity_outcomes: Mutex<Vec<ActivityOutcome>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decision_task(&self, task: DecisionTask) {
        self.decision_tasks.lock().push_back(task);
    }

    pub fn push_activity_task(&self, task: ActivityTask) {
        self.activity_tasks.lock().push_back(task);
    }

    /// Serve `page` for `token`
    pub fn add_page(&self, token: impl Into<String>, page: HistoryPage) {
        self.pages.write().insert(token.into(), page);
    }

    /// Fail the next `times` fetches of `token`
    pub fn fail_page(&self, token: impl Into<String>, times: u32) {
        self.page_failures.lock().insert(token.into(), times);
    }

    pub fn set_execution_context(&self, workflow_id: impl Into<String>, context: impl Into<String>) {
        self.contexts.write().insert(workflow_id.into(), context.into());
    }

    pub fn execution_context(&self, workflow_id: &str) -> Option<String> {
        self.contexts.read().get(workflow_id).cloned()
    }

    pub fn pending_decision_tasks(&self) -> usize {
        self.decision_tasks.lock().len()
    }

    pub fn pending_activity_tasks(&self) -> usize {
        self.activity_tasks.lock().len()
    }

    /// Number of history page requests served or failed
    pub fn page_requests(&self) -> u32 {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn decision_responses(&self) -> Vec<RespondDecision> {
        self.decision_responses.lock().clone()
    }

    pub fn activity_outcomes(&self) -> Vec<ActivityOutcome> {
        self.activity_outcomes.lock().clone()
    }
}

#[async_trait]
impl HistoryPager for InMemoryPlatform {
    async fn next_history_page(&self, next_page_token: &str) -> Result<HistoryPage, PlatformError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.page_failures.lock();
            if let Some(remaining) = failures.get_mut(next_page_token) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PlatformError::Unavailable(format!(
                        "page {next_page_token} temporarily unavailable"
                    )));
                }
            }
        }

        self.pages
            .read()
            .get(next_page_token)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("page token {next_page_token}")))
    }
}

#[async_trait]
impl OrchestrationPlatform for InMemoryPlatform {
    async fn poll_for_decision_task(
        &self,
        _request: &PollRequest,
    ) -> Result<Option<DecisionTask>, PlatformError> {
        let task = self.decision_tasks.lock().pop_front();
        if let Some(task) = &task {
            self.task_executions.lock().insert(
                task.task_token.clone(),
                task.workflow_execution.workflow_id.clone(),
            );
        }
        Ok(task)
    }

    async fn respond_decision_task_completed(
        &self,
        response: RespondDecision,
    ) -> Result<(), PlatformError> {
        let workflow_id = self.task_executions.lock().remove(&response.task_token);
        if let (Some(workflow_id), Some(context)) = (workflow_id, &response.execution_context) {
            self.set_execution_context(workflow_id, context.clone());
        }
        self.decision_responses.lock().push(response);
        Ok(())
    }

    async fn poll_for_activity_task(
        &self,
        _request: &PollRequest,
    ) -> Result<Option<ActivityTask>, PlatformError> {
        Ok(self.activity_tasks.lock().pop_front())
    }

    async fn respond_activity_task_completed(
        &self,
        task_token: &str,
        result: String,
    ) -> Result<(), PlatformError> {
        self.activity_outcomes.lock().push(ActivityOutcome::Completed {
            task_token: task_token.to_string(),
            result,
        });
        Ok(())
    }

    async fn respond_activity_task_failed(
        &self,
        task_token: &str,
        reason: String,
        details: String,
    ) -> Result<(), PlatformError> {
        self.activity_outcomes.lock().push(ActivityOutcome::Failed {
            task_token: task_token.to_string(),
            reason,
            details,
        });
        Ok(())
    }

    async fn describe_execution(
        &self,
        _domain: &str,
        execution: &WorkflowExecution,
    ) -> Result<ExecutionDescription, PlatformError> {
        Ok(ExecutionDescription {
            execution: execution.clone(),
            latest_execution_context: self.execution_context(&execution.workflow_id),
        })
    }
}
