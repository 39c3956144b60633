//! Orchestration platform interface
//!
//! The engine talks to the hosted platform only through
//! [`OrchestrationPlatform`]. [`InMemoryPlatform`] is a scripted
//! implementation for tests and local runs.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::decider::Decision;
use crate::history::{HistoryEvent, HistoryPage, HistoryPager, TypeRef, WorkflowExecution};

pub use memory::{ActivityOutcome, InMemoryPlatform};

/// Error type for platform calls
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Transient failure; the call may be retried
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// Unknown task token, execution or page token
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform rejected the request
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A decision task handed out by the platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTask {
    pub task_token: String,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    /// First page of history
    pub events: Vec<HistoryEvent>,
    pub next_page_token: Option<String>,
}

impl DecisionTask {
    /// Split off the first history page
    pub fn first_page(&mut self) -> HistoryPage {
        HistoryPage {
            events: std::mem::take(&mut self.events),
            next_page_token: self.next_page_token.take(),
        }
    }
}

/// Response to a decision task
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RespondDecision {
    pub task_token: String,
    pub decisions: Vec<Decision>,
    /// Opaque state the platform stores with the execution
    pub execution_context: Option<String>,
}

/// An activity task handed out by the platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityTask {
    pub task_token: String,
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub input: Option<String>,
    pub workflow_execution: WorkflowExecution,
}

/// Where to poll
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollRequest {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
}

/// What the platform reports about one execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionDescription {
    pub execution: WorkflowExecution,
    /// Context handed back with the latest decision response
    pub latest_execution_context: Option<String>,
}

/// Calls the engine makes against the orchestration platform
#[async_trait]
pub trait OrchestrationPlatform: HistoryPager {
    /// Long-poll for a decision task; `None` when the poll timed out empty
    async fn poll_for_decision_task(
        &self,
        request: &PollRequest,
    ) -> Result<Option<DecisionTask>, PlatformError>;

    async fn respond_decision_task_completed(
        &self,
        response: RespondDecision,
    ) -> Result<(), PlatformError>;

    /// Long-poll for an activity task; `None` when the poll timed out empty
    async fn poll_for_activity_task(
        &self,
        request: &PollRequest,
    ) -> Result<Option<ActivityTask>, PlatformError>;

    async fn respond_activity_task_completed(
        &self,
        task_token: &str,
        result: String,
    ) -> Result<(), PlatformError>;

    async fn respond_activity_task_failed(
        &self,
        task_token: &str,
        reason: String,
        details: String,
    ) -> Result<(), PlatformError>;

    async fn describe_execution(
        &self,
        domain: &str,
        execution: &WorkflowExecution,
    ) -> Result<ExecutionDescription, PlatformError>;
}
