//! Deciding what happens next
//!
//! - [`Decision`] - instructions returned to the platform
//! - [`Decider`] - one handler per decision type, implemented by [`Workflow`](crate::workflow::Workflow)
//! - [`make_decision`] - dispatch from a folded context to a handler
//! - [`WorkflowEventsProcessor`] - one full decision cycle for a decision task

mod decision;
mod dispatch;
mod next_step;
mod processor;
mod scheduler;

pub use decision::{
    Decision, RecordMarker, ScheduleActivityTask, StartChildWorkflowExecution, StartTimer,
    StepDecision, DECIDER_NOT_FOUND, STATE_UNDEFINED, SUSPEND_EXPIRED,
};
pub use dispatch::{make_decision, Decider};
pub use processor::WorkflowEventsProcessor;

use crate::platform::PlatformError;
use crate::state::StateError;
use crate::storage::StorageError;

/// Decider errors
#[derive(Debug, thiserror::Error)]
pub enum DeciderError {
    /// The context's decision type has no handler
    #[error("unhandled decision type: {0}")]
    UnhandledDecisionType(String),

    /// A control marker names a step that does not exist
    #[error("step {0} not found")]
    StepNotFound(i32),

    /// Control or execution context could not be encoded or decoded
    #[error(transparent)]
    State(#[from] StateError),

    /// Payload offload or hydration failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A user-supplied reducer or handler failed
    #[error("{0:#}")]
    Action(#[from] anyhow::Error),
}
