//! Activity and workflow options with platform defaults

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::StepResult;

/// Render a timeout in seconds as the platform expects it (`"NONE"` when unset)
pub fn timeout_to_string(seconds: i32) -> String {
    if seconds >= 0 {
        seconds.to_string()
    } else {
        "NONE".to_string()
    }
}

/// Options for an activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    /// Task list the activity is dispatched on; falls back to the workflow's
    pub task_list: Option<String>,

    /// Extra version suffix appended to the registered activity version
    pub version: Option<String>,

    pub description: Option<String>,

    /// Attempts before a platform failure fails the workflow
    pub max_attempts: i32,

    pub schedule_to_close_timeout: i32,
    pub schedule_to_start_timeout: i32,
    pub start_to_close_timeout: i32,

    /// Negative means no heartbeat timeout
    pub heartbeat_timeout: i32,

    /// Delay before each (re)scheduling, in seconds
    pub delay_seconds: i32,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            task_list: None,
            version: None,
            description: None,
            max_attempts: 3,
            schedule_to_close_timeout: 60,
            schedule_to_start_timeout: 60,
            start_to_close_timeout: 60,
            heartbeat_timeout: -1,
            delay_seconds: 0,
        }
    }
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task list
    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    /// Set the activity version suffix
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the start-to-close timeout in seconds
    pub fn with_start_to_close_timeout(mut self, seconds: i32) -> Self {
        self.start_to_close_timeout = seconds;
        self
    }

    /// Set the heartbeat timeout in seconds
    pub fn with_heartbeat_timeout(mut self, seconds: i32) -> Self {
        self.heartbeat_timeout = seconds;
        self
    }

    /// Set the scheduling delay in seconds
    pub fn with_delay(mut self, seconds: i32) -> Self {
        self.delay_seconds = seconds;
        self
    }
}

/// Custom routing between steps
///
/// Called with the current step key and the serialized step output. A
/// successful result whose `step_key` names an existing step redirects the
/// workflow there, with `return_value` as that step's input.
pub type NextStepHandler =
    Arc<dyn Fn(&str, &str) -> anyhow::Result<StepResult<String>> + Send + Sync>;

/// Options for a workflow (root or child)
#[derive(Clone)]
pub struct WorkflowOptions {
    pub domain: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub task_list: String,
    pub task_start_to_close_timeout: i32,
    pub execution_start_to_close_timeout: i32,
    pub retention_period_days: i32,
    /// Attempts for a failed child execution before the parent fails
    pub max_attempts: i32,
    /// Delay before scheduling this workflow as a child, in seconds
    pub delay_seconds: i32,
    pub next_step_handler: Option<NextStepHandler>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            domain: String::new(),
            name: String::new(),
            version: "1.0".to_string(),
            description: None,
            task_list: String::new(),
            task_start_to_close_timeout: 150,
            execution_start_to_close_timeout: 300,
            retention_period_days: 1,
            max_attempts: 3,
            delay_seconds: 0,
            next_step_handler: None,
        }
    }
}

impl WorkflowOptions {
    /// Options for a named workflow on a task list
    pub fn new(name: impl Into<String>, task_list: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_list: task_list.into(),
            ..Default::default()
        }
    }

    /// Set the domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set maximum attempts
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the execution start-to-close timeout in seconds
    pub fn with_execution_timeout(mut self, seconds: i32) -> Self {
        self.execution_start_to_close_timeout = seconds;
        self
    }

    /// Set the scheduling delay in seconds
    pub fn with_delay(mut self, seconds: i32) -> Self {
        self.delay_seconds = seconds;
        self
    }

    /// Install a custom next-step handler
    pub fn with_next_step_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str) -> anyhow::Result<StepResult<String>> + Send + Sync + 'static,
    {
        self.next_step_handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for WorkflowOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowOptions")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("task_list", &self.task_list)
            .field("max_attempts", &self.max_attempts)
            .field("next_step_handler", &self.next_step_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_defaults() {
        let options = ActivityOptions::default();
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.schedule_to_close_timeout, 60);
        assert_eq!(options.schedule_to_start_timeout, 60);
        assert_eq!(options.start_to_close_timeout, 60);
        assert_eq!(timeout_to_string(options.heartbeat_timeout), "NONE");
        assert_eq!(options.delay_seconds, 0);
    }

    #[test]
    fn test_workflow_defaults() {
        let options = WorkflowOptions::new("orders", "orders-tl");
        assert_eq!(options.task_start_to_close_timeout, 150);
        assert_eq!(options.execution_start_to_close_timeout, 300);
        assert_eq!(options.retention_period_days, 1);
        assert_eq!(options.max_attempts, 3);
        assert!(options.next_step_handler.is_none());
    }

    #[test]
    fn test_builders() {
        let options = ActivityOptions::new()
            .with_task_list("fast")
            .with_max_attempts(0)
            .with_delay(5);
        assert_eq!(options.task_list.as_deref(), Some("fast"));
        assert_eq!(options.max_attempts, 1);
        assert_eq!(options.delay_seconds, 5);

        let wf = WorkflowOptions::new("w", "tl")
            .with_domain("prod")
            .with_next_step_handler(|_, input| Ok(StepResult::success(input.to_string())));
        assert_eq!(wf.domain, "prod");
        assert!(wf.next_step_handler.is_some());
    }
}
