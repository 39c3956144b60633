//! Execution-level aggregate persisted in the platform's execution context

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{non_blank, StateError};

/// Progress of one workflow execution between decision cycles
///
/// Rebuilt from the stored execution context at the start of a cycle and
/// handed back, serialized, with the decision response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowState {
    pub current_step_number: i32,
    pub number_of_actions: i32,
    /// Result reference per action number of the current step
    #[serde(default)]
    pub results: BTreeMap<i32, String>,
}

impl WorkflowState {
    /// State for a freshly entered step with a single action
    pub fn new(step_number: i32) -> Self {
        Self {
            current_step_number: step_number,
            number_of_actions: 1,
            results: BTreeMap::new(),
        }
    }

    /// Record the result reference of one action
    pub fn record_result(&mut self, action_number: i32, result_ref: impl Into<String>) {
        self.results.insert(action_number, result_ref.into());
    }

    pub fn encode(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an execution context; blank input means "no state yet"
    pub fn decode(context: Option<&str>) -> Result<Option<Self>, StateError> {
        match non_blank(context) {
            Some(context) => Ok(Some(serde_json::from_str(context)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = WorkflowState::new(3);
        assert_eq!(state.current_step_number, 3);
        assert_eq!(state.number_of_actions, 1);
        assert!(state.results.is_empty());
    }

    #[test]
    fn test_codec_with_results() {
        let mut state = WorkflowState::new(1);
        state.number_of_actions = 2;
        state.record_result(1, "ref-b");
        state.record_result(0, "ref-a");

        let json = state.encode().unwrap();
        let decoded = WorkflowState::decode(Some(&json)).unwrap().unwrap();

        assert_eq!(decoded, state);
        assert_eq!(decoded.results.values().collect::<Vec<_>>(), vec!["ref-a", "ref-b"]);
    }

    #[test]
    fn test_decode_empty_context() {
        assert!(WorkflowState::decode(Some("")).unwrap().is_none());
        assert!(WorkflowState::decode(None).unwrap().is_none());
    }
}
