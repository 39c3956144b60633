//! Decisions returned to the orchestration platform

use serde::{Deserialize, Serialize};

use crate::history::TypeRef;

/// Reason used when no decider matches the execution
pub const DECIDER_NOT_FOUND: &str = "Decider not found.";

/// Reason used when a completion carries no control marker
pub const STATE_UNDEFINED: &str = "State is undefined.";

/// Reason used when a suspendable activity waited too long
pub const SUSPEND_EXPIRED: &str = "Suspendable activity exceeded waiting time.";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleActivityTask {
    pub activity_id: String,
    pub activity_type: TypeRef,
    pub task_list: String,
    pub input: String,
    pub control: String,
    pub schedule_to_close_timeout: String,
    pub schedule_to_start_timeout: String,
    pub start_to_close_timeout: String,
    pub heartbeat_timeout: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartChildWorkflowExecution {
    pub workflow_id: String,
    pub workflow_type: TypeRef,
    pub task_list: String,
    pub input: String,
    pub control: String,
    pub execution_start_to_close_timeout: String,
    pub task_start_to_close_timeout: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StartTimer {
    pub timer_id: String,
    /// Seconds, as a decimal string
    pub start_to_fire_timeout: String,
    pub control: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordMarker {
    pub marker_name: String,
    pub details: String,
}

/// One instruction for the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision_type", content = "attributes")]
pub enum Decision {
    ScheduleActivityTask(ScheduleActivityTask),
    StartChildWorkflowExecution(StartChildWorkflowExecution),
    StartTimer(StartTimer),
    RecordMarker(RecordMarker),
    CompleteWorkflowExecution { result: String },
    FailWorkflowExecution { reason: String, details: String },
    CancelWorkflowExecution { details: String },
}

impl Decision {
    pub fn complete(result: impl Into<String>) -> Self {
        Self::CompleteWorkflowExecution {
            result: result.into(),
        }
    }

    pub fn fail(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::FailWorkflowExecution {
            reason: reason.into(),
            details: details.into(),
        }
    }

    pub fn cancel(details: impl Into<String>) -> Self {
        Self::CancelWorkflowExecution {
            details: details.into(),
        }
    }

    /// Whether this decision closes the execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflowExecution { .. }
                | Self::FailWorkflowExecution { .. }
                | Self::CancelWorkflowExecution { .. }
        )
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScheduleActivityTask(_) => "ScheduleActivityTask",
            Self::StartChildWorkflowExecution(_) => "StartChildWorkflowExecution",
            Self::StartTimer(_) => "StartTimer",
            Self::RecordMarker(_) => "RecordMarker",
            Self::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Self::FailWorkflowExecution { .. } => "FailWorkflowExecution",
            Self::CancelWorkflowExecution { .. } => "CancelWorkflowExecution",
        }
    }

    /// The user payload carried by this decision, if any
    ///
    /// These are the values subject to blob offload.
    pub fn payload_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::ScheduleActivityTask(d) => Some(&mut d.input),
            Self::StartChildWorkflowExecution(d) => Some(&mut d.input),
            Self::RecordMarker(d) => Some(&mut d.details),
            Self::CompleteWorkflowExecution { result } => Some(result),
            Self::StartTimer(_)
            | Self::FailWorkflowExecution { .. }
            | Self::CancelWorkflowExecution { .. } => None,
        }
    }
}

/// Decisions produced for one step
pub type StepDecision = Vec<Decision>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_decisions() {
        assert!(Decision::complete("r").is_terminal());
        assert!(Decision::fail("r", "d").is_terminal());
        assert!(Decision::cancel("d").is_terminal());
        assert!(!Decision::StartTimer(StartTimer::default()).is_terminal());
    }

    #[test]
    fn test_payload_mut() {
        let mut marker = Decision::RecordMarker(RecordMarker {
            marker_name: "m".into(),
            details: "x".into(),
        });
        *marker.payload_mut().unwrap() = "y".into();

        assert!(matches!(marker, Decision::RecordMarker(ref m) if m.details == "y"));
        assert!(Decision::fail("a", "b").payload_mut().is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Decision::fail("boom", "id")).unwrap();
        assert_eq!(json["decision_type"], "FailWorkflowExecution");
        assert_eq!(json["attributes"]["reason"], "boom");
    }
}
