//! BlobStore trait definition

use async_trait::async_trait;

/// Error type for blob store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No object under the key
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("blob store error: {0}")]
    Backend(String),
}

/// Object storage used for oversized payloads
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store content and return its key
    async fn put(&self, content: &str) -> Result<String, StorageError>;

    /// Read content by key
    async fn get(&self, key: &str) -> Result<String, StorageError>;

    /// Delete content by key
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
