//! Per-action control marker

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, StateError};

/// Compact marker attached to every scheduled activity, child workflow and
/// delay timer
///
/// The platform stores it verbatim in the control field and hands it back
/// with every completion, failure or timeout of that unit of work. Identity
/// is `(step_number, action_number)`; the remaining fields are bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulableState {
    pub step_number: i32,
    pub step_key: String,
    pub action_number: i32,
    pub total_actions: i32,
    pub attempt_number: i32,
    pub max_attempts: i32,
    pub delay_seconds: i32,
    /// When the action was first scheduled; written once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl SchedulableState {
    /// Create a marker for one action of a step
    pub fn new(
        step_number: i32,
        step_key: impl Into<String>,
        action_number: i32,
        total_actions: i32,
    ) -> Self {
        Self {
            step_number,
            step_key: step_key.into(),
            action_number,
            total_actions,
            ..Default::default()
        }
    }

    /// Set the attempt number
    pub fn with_attempt(mut self, attempt_number: i32) -> Self {
        self.attempt_number = attempt_number;
        self
    }

    /// Set the maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the scheduling delay
    pub fn with_delay(mut self, delay_seconds: i32) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    /// Record the first scheduling time; later calls are ignored
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Seconds elapsed since the first scheduling, if known
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at.map(|started| (now - started).num_seconds())
    }

    /// Encode into a control string
    pub fn encode(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a control string; blank input means "no marker"
    pub fn decode(control: Option<&str>) -> Result<Option<Self>, StateError> {
        match non_blank(control) {
            Some(control) => Ok(Some(serde_json::from_str(control)?)),
            None => Ok(None),
        }
    }
}

impl PartialEq for SchedulableState {
    fn eq(&self, other: &Self) -> bool {
        self.step_number == other.step_number && self.action_number == other.action_number
    }
}

impl Eq for SchedulableState {}

impl Hash for SchedulableState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.step_number.hash(state);
        self.action_number.hash(state);
    }
}
