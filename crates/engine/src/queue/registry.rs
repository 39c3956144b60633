//! Process-wide cache of queue urls

use dashmap::DashMap;
use tracing::debug;

use super::{MessageQueue, QueueError};

/// Maps logical queue names to resolved urls
///
/// Populated lazily on first use and shared between workers; safe for
/// concurrent lookup and insert.
#[derive(Debug, Default)]
pub struct QueueNameRegistry {
    urls: DashMap<String, String>,
}

impl QueueNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached url for a queue name
    pub fn get(&self, queue_name: &str) -> Option<String> {
        self.urls.get(queue_name).map(|url| url.value().clone())
    }

    pub fn insert(&self, queue_name: impl Into<String>, url: impl Into<String>) {
        self.urls.insert(queue_name.into(), url.into());
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Cached url, resolving through `queue` on a miss
    pub async fn resolve<Q: MessageQueue + ?Sized>(
        &self,
        queue: &Q,
        queue_name: &str,
    ) -> Result<String, QueueError> {
        if let Some(url) = self.get(queue_name) {
            return Ok(url);
        }

        let url = queue.resolve_url(queue_name).await?;
        debug!(%queue_name, %url, "resolved queue url");
        // Concurrent resolvers may race here; the first insert wins
        Ok(self
            .urls
            .entry(queue_name.to_string())
            .or_insert(url)
            .value()
            .clone())
    }
}
