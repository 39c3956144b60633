//! Polling loops
//!
//! [`DecisionWorker`] answers decision tasks by replaying history through
//! a [`WorkflowEventsProcessor`](crate::decider::WorkflowEventsProcessor).
//! [`ActivityWorker`] runs activity bodies. Both poll one task at a time and
//! stop when the shutdown channel flips to `true`.

mod activity;
mod decision;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::decider::DeciderError;
use crate::platform::PlatformError;
use crate::reliability::RetryPolicy;
use crate::storage::StorageError;

pub use activity::ActivityWorker;
pub use decision::DecisionWorker;

/// Worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("decider error: {0}")]
    Decider(#[from] DeciderError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The poll came back empty
    Idle,
    /// A task was handled and answered
    Processed,
}

/// A worker that polls the platform for one kind of task
#[async_trait]
pub trait PollingWorker: Send + Sync {
    /// Name used in log events
    fn kind(&self) -> &'static str;

    /// Pause between polls
    fn poll_interval(&self) -> Duration;

    /// Poll once and handle whatever came back
    async fn run_once(&self) -> Result<PollOutcome, WorkerError>;

    /// Poll until shutdown is signaled
    ///
    /// Errors are logged and the loop keeps going, backing off while they
    /// repeat.
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let error_backoff = RetryPolicy::exponential().with_max_attempts(u32::MAX);
        let mut consecutive_errors: u32 = 0;
        info!(worker = self.kind(), "worker started");

        loop {
            if *shutdown.borrow() {
                debug!(worker = self.kind(), "shutdown requested");
                break;
            }

            let pause = match self.run_once().await {
                Ok(_) => {
                    consecutive_errors = 0;
                    self.poll_interval()
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    error!(
                        worker = self.kind(),
                        consecutive_errors,
                        error = %e,
                        "poll iteration failed"
                    );
                    error_backoff
                        .delay_for_attempt(consecutive_errors.saturating_add(1))
                        .max(self.poll_interval())
                }
            };

            if wait_or_shutdown(pause, &mut shutdown).await {
                debug!(worker = self.kind(), "shutdown signal received during wait");
                break;
            }
        }

        info!(worker = self.kind(), "worker stopped");
    }
}

/// Sleep for `pause`; returns `true` when shutdown was signaled first
async fn wait_or_shutdown(pause: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(pause) => false,
        changed = shutdown.changed() => {
            // A dropped sender also ends the loop
            changed.is_err() || *shutdown.borrow()
        }
    }
}
