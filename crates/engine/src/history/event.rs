//! Execution history events as reported by the orchestration platform

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name/version pair identifying a registered workflow or activity type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub version: String,
}

impl TypeRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Identity of one run of a workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Discriminant of a [`HistoryEvent`]
///
/// This is also the "decision type" of a [`DecisionContext`](crate::context::DecisionContext):
/// the type of the last event that asks the decider to act.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionContinuedAsNew,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionSignaled,
    WorkflowExecutionCompleted,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ScheduleActivityTaskFailed,
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionTerminated,
    ChildWorkflowExecutionTimedOut,
    MarkerRecorded,
    TimerStarted,
    TimerFired,
    TimerCanceled,
    /// Any platform event type the engine does not interpret
    Unknown,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// Event attributes
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionStartedAttributes {
    pub workflow_type: TypeRef,
    pub input: Option<String>,
    pub task_list: Option<String>,
    /// Set when this execution was started as a child of another one
    pub parent_workflow_execution: Option<WorkflowExecution>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionContinuedAsNewAttributes {
    pub input: Option<String>,
    pub new_execution_run_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionCancelRequestedAttributes {
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionSignaledAttributes {
    pub signal_name: String,
    pub input: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionCompletedAttributes {
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionTaskCompletedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    /// Opaque context handed back with the previous decision response
    pub execution_context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityTaskScheduledAttributes {
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub control: Option<String>,
    pub input: Option<String>,
    pub task_list: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityTaskStartedAttributes {
    pub scheduled_event_id: i64,
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityTaskCompletedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityTaskFailedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityTaskTimedOutAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub timeout_type: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleActivityTaskFailedAttributes {
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub cause: String,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartChildWorkflowExecutionInitiatedAttributes {
    pub workflow_id: String,
    pub workflow_type: TypeRef,
    pub control: Option<String>,
    pub input: Option<String>,
    pub task_list: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartChildWorkflowExecutionFailedAttributes {
    pub workflow_id: String,
    pub workflow_type: TypeRef,
    pub cause: String,
    pub control: Option<String>,
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowExecutionStartedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowExecutionCompletedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    pub initiated_event_id: i64,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowExecutionFailedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    pub initiated_event_id: i64,
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowExecutionTerminatedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChildWorkflowExecutionTimedOutAttributes {
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: TypeRef,
    pub initiated_event_id: i64,
    pub timeout_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkerRecordedAttributes {
    pub marker_name: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimerStartedAttributes {
    pub timer_id: String,
    /// Seconds, as a decimal string
    pub start_to_fire_timeout: String,
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimerFiredAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimerCanceledAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
}

/// Typed attributes of a history event, one variant per event type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", content = "attributes")]
pub enum EventAttributes {
    // =========================================================================
    // Workflow execution
    // =========================================================================
    WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
    WorkflowExecutionContinuedAsNew(WorkflowExecutionContinuedAsNewAttributes),
    WorkflowExecutionCancelRequested(WorkflowExecutionCancelRequestedAttributes),
    WorkflowExecutionSignaled(WorkflowExecutionSignaledAttributes),
    WorkflowExecutionCompleted(WorkflowExecutionCompletedAttributes),

    // =========================================================================
    // Decision tasks
    // =========================================================================
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted(DecisionTaskCompletedAttributes),

    // =========================================================================
    // Activities
    // =========================================================================
    ActivityTaskScheduled(ActivityTaskScheduledAttributes),
    ActivityTaskStarted(ActivityTaskStartedAttributes),
    ActivityTaskCompleted(ActivityTaskCompletedAttributes),
    ActivityTaskFailed(ActivityTaskFailedAttributes),
    ActivityTaskTimedOut(ActivityTaskTimedOutAttributes),
    ScheduleActivityTaskFailed(ScheduleActivityTaskFailedAttributes),

    // =========================================================================
    // Child workflows
    // =========================================================================
    StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes),
    StartChildWorkflowExecutionFailed(StartChildWorkflowExecutionFailedAttributes),
    ChildWorkflowExecutionStarted(ChildWorkflowExecutionStartedAttributes),
    ChildWorkflowExecutionCompleted(ChildWorkflowExecutionCompletedAttributes),
    ChildWorkflowExecutionFailed(ChildWorkflowExecutionFailedAttributes),
    ChildWorkflowExecutionTerminated(ChildWorkflowExecutionTerminatedAttributes),
    ChildWorkflowExecutionTimedOut(ChildWorkflowExecutionTimedOutAttributes),

    // =========================================================================
    // Markers and timers
    // =========================================================================
    MarkerRecorded(MarkerRecordedAttributes),
    TimerStarted(TimerStartedAttributes),
    TimerFired(TimerFiredAttributes),
    TimerCanceled(TimerCanceledAttributes),

    /// Platform event type without engine semantics
    Other { name: String },
}

impl EventAttributes {
    /// Get the plain event type
    pub fn event_type(&self) -> EventType {
        match self {
            Self::WorkflowExecutionStarted(_) => EventType::WorkflowExecutionStarted,
            Self::WorkflowExecutionContinuedAsNew(_) => EventType::WorkflowExecutionContinuedAsNew,
            Self::WorkflowExecutionCancelRequested(_) => {
                EventType::WorkflowExecutionCancelRequested
            }
            Self::WorkflowExecutionSignaled(_) => EventType::WorkflowExecutionSignaled,
            Self::WorkflowExecutionCompleted(_) => EventType::WorkflowExecutionCompleted,
            Self::DecisionTaskScheduled => EventType::DecisionTaskScheduled,
            Self::DecisionTaskStarted => EventType::DecisionTaskStarted,
            Self::DecisionTaskCompleted(_) => EventType::DecisionTaskCompleted,
            Self::ActivityTaskScheduled(_) => EventType::ActivityTaskScheduled,
            Self::ActivityTaskStarted(_) => EventType::ActivityTaskStarted,
            Self::ActivityTaskCompleted(_) => EventType::ActivityTaskCompleted,
            Self::ActivityTaskFailed(_) => EventType::ActivityTaskFailed,
            Self::ActivityTaskTimedOut(_) => EventType::ActivityTaskTimedOut,
            Self::ScheduleActivityTaskFailed(_) => EventType::ScheduleActivityTaskFailed,
            Self::StartChildWorkflowExecutionInitiated(_) => {
                EventType::StartChildWorkflowExecutionInitiated
            }
            Self::StartChildWorkflowExecutionFailed(_) => {
                EventType::StartChildWorkflowExecutionFailed
            }
            Self::ChildWorkflowExecutionStarted(_) => EventType::ChildWorkflowExecutionStarted,
            Self::ChildWorkflowExecutionCompleted(_) => EventType::ChildWorkflowExecutionCompleted,
            Self::ChildWorkflowExecutionFailed(_) => EventType::ChildWorkflowExecutionFailed,
            Self::ChildWorkflowExecutionTerminated(_) => {
                EventType::ChildWorkflowExecutionTerminated
            }
            Self::ChildWorkflowExecutionTimedOut(_) => EventType::ChildWorkflowExecutionTimedOut,
            Self::MarkerRecorded(_) => EventType::MarkerRecorded,
            Self::TimerStarted(_) => EventType::TimerStarted,
            Self::TimerFired(_) => EventType::TimerFired,
            Self::TimerCanceled(_) => EventType::TimerCanceled,
            Self::Other { .. } => EventType::Unknown,
        }
    }
}

/// One immutable record of an execution's history
///
/// Ids are assigned by the platform, start at 1 and strictly increase within
/// an execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEvent {
    pub event_id: i64,
    pub event_timestamp: DateTime<Utc>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    /// Create an event stamped with the current time
    pub fn new(event_id: i64, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            event_timestamp: Utc::now(),
            attributes,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.attributes.event_type()
    }
}

/// Find an event by its 1-based id within an ordered slice of history
pub fn find_event(events: &[HistoryEvent], event_id: i64) -> Option<&HistoryEvent> {
    if event_id < 1 {
        return None;
    }
    let index = (event_id - 1) as usize;
    match events.get(index) {
        Some(event) if event.event_id == event_id => Some(event),
        // Histories that do not start at 1 (e.g. a synthetic slice) fall back to a scan
        _ => events.iter().find(|e| e.event_id == event_id),
    }
}
