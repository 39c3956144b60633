//! State that round-trips through the platform
//!
//! - [`SchedulableState`] - per-action marker carried in every control field
//! - [`WorkflowState`] - per-execution aggregate carried in the execution context

mod schedulable;
mod workflow_state;

pub use schedulable::SchedulableState;
pub use workflow_state::WorkflowState;

/// Codec errors for platform-carried state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Encoding or decoding failed
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Treat absent and blank strings the same way
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
