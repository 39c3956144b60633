//! Threshold-based offload of platform payloads

use std::sync::Arc;

use tracing::{debug, warn};

use super::{BlobStore, StorageError};

/// Prefix of a value that stands for a blob
pub const REFERENCE_MARKER: &str = "-..blobKey..-";

/// Largest value embedded inline, in bytes
pub const DEFAULT_PAYLOAD_THRESHOLD: usize = 32_768;

/// Replaces oversized values with blob references and resolves them back
///
/// Without a blob store every call is a pass-through.
#[derive(Clone)]
pub struct PayloadStore {
    store: Option<Arc<dyn BlobStore>>,
    threshold: usize,
}

impl Default for PayloadStore {
    fn default() -> Self {
        Self::disabled()
    }
}

impl PayloadStore {
    /// Offload values larger than `threshold` bytes to `store`
    pub fn new(store: Arc<dyn BlobStore>, threshold: usize) -> Self {
        Self {
            store: Some(store),
            threshold,
        }
    }

    /// Pass every value through unchanged
    pub fn disabled() -> Self {
        Self {
            store: None,
            threshold: DEFAULT_PAYLOAD_THRESHOLD,
        }
    }

    /// Whether a value is a blob reference
    pub fn is_reference(value: &str) -> bool {
        value.starts_with(REFERENCE_MARKER)
    }

    /// Store a value if it is over the threshold and return what to embed
    pub async fn offload(&self, value: &str) -> Result<String, StorageError> {
        let Some(store) = &self.store else {
            return Ok(value.to_string());
        };
        if value.is_empty() || value.len() <= self.threshold || Self::is_reference(value) {
            return Ok(value.to_string());
        }

        let key = store.put(value).await?;
        debug!(%key, size = value.len(), "offloaded payload");
        Ok(format!("{REFERENCE_MARKER}{key}"))
    }

    /// Resolve a reference to its content; other values pass through
    pub async fn hydrate(&self, value: &str) -> Result<String, StorageError> {
        match (&self.store, value.strip_prefix(REFERENCE_MARKER)) {
            (Some(store), Some(key)) => store.get(key).await,
            _ => Ok(value.to_string()),
        }
    }

    /// [`hydrate`](Self::hydrate) for optional fields
    pub async fn hydrate_opt(&self, value: Option<&str>) -> Result<Option<String>, StorageError> {
        match value {
            Some(v) => Ok(Some(self.hydrate(v).await?)),
            None => Ok(None),
        }
    }

    /// Delete the blob behind a reference
    ///
    /// Returns whether anything was deleted. Inline values are ignored.
    pub async fn delete(&self, value: &str) -> Result<bool, StorageError> {
        match (&self.store, value.strip_prefix(REFERENCE_MARKER)) {
            (Some(store), Some(key)) => {
                store.delete(key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete every referenced blob, logging failures
    ///
    /// Returns the number of blobs deleted.
    pub async fn delete_all<'a, I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut deleted = 0;
        for value in values {
            match self.delete(value).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(reference = %value, error = %e, "failed to delete payload"),
            }
        }
        deleted
    }
}

impl std::fmt::Debug for PayloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadStore")
            .field("enabled", &self.store.is_some())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlobStore;

    fn store(threshold: usize) -> (Arc<InMemoryBlobStore>, PayloadStore) {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let payloads = PayloadStore::new(blobs.clone(), threshold);
        (blobs, payloads)
    }

    #[tokio::test]
    async fn test_small_values_pass_through() {
        let (blobs, payloads) = store(8);

        assert_eq!(payloads.offload("12345678").await.unwrap(), "12345678");
        assert_eq!(payloads.offload("").await.unwrap(), "");
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_large_values_round_trip() {
        let (blobs, payloads) = store(8);

        let reference = payloads.offload("123456789").await.unwrap();
        assert!(PayloadStore::is_reference(&reference));
        assert_eq!(blobs.len(), 1);
        assert_eq!(payloads.hydrate(&reference).await.unwrap(), "123456789");

        assert!(payloads.delete(&reference).await.unwrap());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_store_is_identity() {
        let payloads = PayloadStore::disabled();
        let large = "x".repeat(DEFAULT_PAYLOAD_THRESHOLD * 2);

        assert_eq!(payloads.offload(&large).await.unwrap(), large);
        let fake = format!("{REFERENCE_MARKER}abc");
        assert_eq!(payloads.hydrate(&fake).await.unwrap(), fake);
        assert!(!payloads.delete(&fake).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_counts_and_swallows_errors() {
        let (_blobs, payloads) = store(1);

        let a = payloads.offload("aaaa").await.unwrap();
        let missing = format!("{REFERENCE_MARKER}missing");
        let deleted = payloads
            .delete_all([a.as_str(), "inline", missing.as_str()])
            .await;

        assert_eq!(deleted, 1);
    }
}
