//! Result envelope exchanged between activities, child workflows and the decider

use serde::{Deserialize, Serialize};

/// Outcome of one step action
///
/// `step_key`, when set by a next-step handler, names the step to continue
/// with instead of the next one in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepResult<T = String> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    pub return_value: T,
}

impl<T> StepResult<T> {
    /// Successful result
    pub fn success(return_value: T) -> Self {
        Self {
            success: true,
            step_key: None,
            return_value,
        }
    }

    /// Failed result
    pub fn failure(return_value: T) -> Self {
        Self {
            success: false,
            step_key: None,
            return_value,
        }
    }

    /// Route to the step with this key
    pub fn with_step_key(mut self, step_key: impl Into<String>) -> Self {
        self.step_key = Some(step_key.into());
        self
    }
}

impl StepResult<String> {
    /// Parse a serialized envelope
    ///
    /// Non-string return values are kept as their JSON text; anything that is
    /// not an envelope becomes a failed result carrying the raw text.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_else(|| Self::failure(raw.to_string()))
    }

    /// Parse a serialized envelope, `None` when `raw` is not one
    pub fn try_parse(raw: &str) -> Option<Self> {
        let envelope = serde_json::from_str::<StepResult<serde_json::Value>>(raw).ok()?;
        Some(Self {
            success: envelope.success,
            step_key: envelope.step_key,
            return_value: value_to_text(envelope.return_value),
        })
    }
}

impl<T: Serialize> StepResult<T> {
    /// Serialize the envelope
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub(crate) fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
