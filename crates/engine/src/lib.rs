//! # Stepflow Engine
//!
//! Client-side decision engine for an event-sourced workflow orchestration
//! platform. The platform keeps the execution history; this crate replays it
//! on every decision task and answers with the next decisions.
//!
//! ## Features
//!
//! - **History replay**: paginated history is folded into a [`DecisionContext`]
//! - **Step trees**: sequential steps of activities, suspendable activities,
//!   child workflows and parallel collections, nested to any depth
//! - **Retries and routing**: bounded retries with delays, next-step handlers
//! - **Large payloads**: values over a threshold travel as blob store references
//! - **Workers**: polling loops for decision and activity tasks with graceful shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       DecisionWorker                         │
//! │  (polls decision tasks, answers with decisions)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WorkflowEventsProcessor                     │
//! │  (history replay -> DecisionContext -> Decider -> offload)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   OrchestrationPlatform                      │
//! │  (history pages, task polling, responses)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stepflow_engine::prelude::*;
//!
//! let workflow = Workflow::new(WorkflowOptions::new("orders", "orders-tl"))
//!     .with_step("charge", Action::Activity(Activity::new("charge")))
//!     .unwrap()
//!     .with_step("ship", Action::Activity(Activity::new("ship")))
//!     .unwrap();
//!
//! let platform = Arc::new(InMemoryPlatform::new());
//! let worker = DecisionWorker::new(platform, Arc::new(workflow), WorkerConfig::default());
//! assert_eq!(worker.config().poll_interval.as_millis(), 200);
//! ```

pub mod config;
pub mod context;
pub mod decider;
pub mod history;
pub mod platform;
pub mod queue;
pub mod reliability;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod worker;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{ConfigError, WorkerConfig};
    pub use crate::context::DecisionContext;
    pub use crate::decider::{Decider, DeciderError, Decision, WorkflowEventsProcessor};
    pub use crate::history::{EventType, HistoryEvent, WorkflowExecution};
    pub use crate::platform::{InMemoryPlatform, OrchestrationPlatform, PlatformError};
    pub use crate::reliability::RetryPolicy;
    pub use crate::storage::{BlobStore, InMemoryBlobStore, PayloadStore, StorageError};
    pub use crate::worker::{ActivityWorker, DecisionWorker, PollingWorker, WorkerError};
    pub use crate::workflow::{
        Action, Activity, ActivityOptions, ParallelCollection, StepResult, SuspendableActivity,
        Workflow, WorkflowOptions,
    };
}

// Re-export key types at crate root
pub use config::{ConfigError, WorkerConfig};
pub use context::DecisionContext;
pub use decider::{Decider, DeciderError, Decision, WorkflowEventsProcessor};
pub use platform::{OrchestrationPlatform, PlatformError};
pub use reliability::RetryPolicy;
pub use state::{SchedulableState, StateError, WorkflowState};
pub use storage::{BlobStore, PayloadStore, StorageError};
pub use worker::{ActivityWorker, DecisionWorker, PollingWorker, WorkerError};
pub use workflow::{Action, Activity, StepResult, Workflow, WorkflowOptions};
