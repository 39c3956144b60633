//! In-memory blob store for tests and local runs

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{BlobStore, StorageError};

/// Blob store keeping everything in a map
///
/// # Example
///
/// ```
/// use stepflow_engine::storage::InMemoryBlobStore;
///
/// let store = InMemoryBlobStore::new();
/// assert!(store.is_empty());
/// ```
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, content: &str) -> Result<String, StorageError> {
        let key = Uuid::now_v7().to_string();
        self.blobs.write().insert(key.clone(), content.to_string());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<String, StorageError> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryBlobStore::new();

        let key = store.put("payload").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), "payload");
        assert_eq!(store.len(), 1);

        store.delete(&key).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
