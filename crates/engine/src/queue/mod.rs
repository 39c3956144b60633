//! Message queue layer for activity dispatch
//!
//! [`MessageQueue`] is the narrow client interface. [`QueueManager`] adds
//! typed JSON messages, custom attributes and the large-payload convention:
//! bodies over the size threshold are stored in a blob store and the message
//! carries a reference plus the reserved size attribute.

mod manager;
mod memory;
mod registry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

pub use manager::{QueueManager, ReceivedMessage};
pub use memory::InMemoryQueue;
pub use registry::QueueNameRegistry;

/// Attribute carrying the original size of an offloaded body
pub const RESERVED_ATTRIBUTE_NAME: &str = "LargePayloadSize";

/// Attribute carrying the payload type name
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "MessageTypeName";

/// Custom attributes allowed per message
pub const MAX_CUSTOM_ATTRIBUTES: usize = 9;

/// Largest message (body plus attributes) sent inline, in bytes
pub const DEFAULT_MESSAGE_SIZE_THRESHOLD: usize = 262_144;

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Attribute name is reserved or the attribute limit is reached
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("message body must not be empty")]
    EmptyBody,

    #[error("receipt handle must not be empty")]
    EmptyReceipt,

    /// Message too large and no blob store to offload it to
    #[error("message of {size} bytes exceeds {threshold} bytes")]
    PayloadTooLarge { size: usize, threshold: usize },

    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A message as delivered by the queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

/// Queue client operations
#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    /// Resolve (creating if needed) the url of a named queue
    async fn resolve_url(&self, queue_name: &str) -> Result<String, QueueError>;

    /// Send a message and return its id
    async fn send(
        &self,
        queue_url: &str,
        body: String,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, QueueError>;

    /// Receive up to `max_messages` messages
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a received message
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;
}
