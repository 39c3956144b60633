// Worker configuration
//
// Environment variables (a `.env` file is loaded first when present):
// - STEPFLOW_DOMAIN: platform domain (default: "default")
// - STEPFLOW_TASK_LIST: task list to poll (default: "default")
// - STEPFLOW_IDENTITY: worker identity reported to the platform
// - STEPFLOW_POLL_INTERVAL_MS: pause between polls (default: 200)
// - STEPFLOW_PAYLOAD_THRESHOLD: payload offload threshold in bytes (default: 32768)
// - STEPFLOW_HISTORY_RETRIES: attempts per history page fetch (default: 10)

use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::platform::PollRequest;
use crate::reliability::RetryPolicy;
use crate::storage::DEFAULT_PAYLOAD_THRESHOLD;

/// Default pause between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings shared by decision and activity workers
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    pub poll_interval: Duration,
    /// Retry policy for history page fetches
    pub history_retry: RetryPolicy,
    /// Payloads larger than this many bytes go to the blob store
    pub payload_threshold: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            domain: "default".to_string(),
            task_list: "default".to_string(),
            identity: format!("worker-{}", Uuid::now_v7()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            history_retry: RetryPolicy::history_fetch(),
            payload_threshold: DEFAULT_PAYLOAD_THRESHOLD,
        }
    }
}

impl WorkerConfig {
    pub fn new(domain: impl Into<String>, task_list: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            task_list: task_list.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(domain) = read_var("STEPFLOW_DOMAIN") {
            config.domain = domain;
        }
        if let Some(task_list) = read_var("STEPFLOW_TASK_LIST") {
            config.task_list = task_list;
        }
        if let Some(identity) = read_var("STEPFLOW_IDENTITY") {
            config.identity = identity;
        }
        if let Some(millis) = parse_var::<u64>("STEPFLOW_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(millis);
        }
        if let Some(threshold) = parse_var::<usize>("STEPFLOW_PAYLOAD_THRESHOLD")? {
            config.payload_threshold = threshold;
        }
        if let Some(retries) = parse_var::<u32>("STEPFLOW_HISTORY_RETRIES")? {
            config.history_retry = config.history_retry.with_max_attempts(retries);
        }
        Ok(config)
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = task_list.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_history_retry(mut self, retry: RetryPolicy) -> Self {
        self.history_retry = retry;
        self
    }

    pub fn with_payload_threshold(mut self, threshold: usize) -> Self {
        self.payload_threshold = threshold;
        self
    }

    /// Poll request for this worker's task list
    pub fn poll_request(&self) -> PollRequest {
        PollRequest {
            domain: self.domain.clone(),
            task_list: self.task_list.clone(),
            identity: self.identity.clone(),
        }
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match read_var(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(None),
    }
}
