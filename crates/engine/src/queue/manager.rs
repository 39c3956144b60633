//! Typed send/receive with attribute rules and large-payload offload

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use super::*;
use crate::storage::{BlobStore, REFERENCE_MARKER};

/// A received and decoded message
#[derive(Debug, Clone)]
pub struct ReceivedMessage<T> {
    pub payload: T,
    pub receipt_handle: String,
    /// Attributes without the reserved size attribute
    pub attributes: BTreeMap<String, String>,
    /// Blob holding the body, when it was offloaded
    pub blob_key: Option<String>,
}

/// Queue client wrapper used by producers and consumers of activity work
pub struct QueueManager<Q: MessageQueue + ?Sized> {
    queue: Arc<Q>,
    registry: Arc<QueueNameRegistry>,
    blobs: Option<Arc<dyn BlobStore>>,
    threshold: usize,
    attributes: BTreeMap<String, String>,
}

impl<Q: MessageQueue + ?Sized> QueueManager<Q> {
    /// Create a manager sharing `registry` with other workers
    pub fn new(queue: Arc<Q>, registry: Arc<QueueNameRegistry>) -> Self {
        Self {
            queue,
            registry,
            blobs: None,
            threshold: DEFAULT_MESSAGE_SIZE_THRESHOLD,
            attributes: BTreeMap::new(),
        }
    }

    /// Offload large bodies to `blobs`
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Set the inline size threshold in bytes
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Attach a custom attribute to every sent message
    ///
    /// Receivers with custom attributes only accept messages carrying at
    /// least one of them.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let name = name.into();
        if is_reserved(&name) {
            return Err(QueueError::InvalidAttribute(format!("{name} is reserved")));
        }
        if !self.attributes.contains_key(&name) && self.attributes.len() >= MAX_CUSTOM_ATTRIBUTES {
            return Err(QueueError::InvalidAttribute(format!(
                "at most {MAX_CUSTOM_ATTRIBUTES} custom attributes are allowed"
            )));
        }
        self.attributes.insert(name, value.into());
        Ok(self)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Serialize and send a payload, returning the message id
    #[instrument(skip(self, payload))]
    pub async fn send<T: Serialize>(
        &self,
        queue_name: &str,
        payload: &T,
    ) -> Result<String, QueueError> {
        let mut body = serde_json::to_string(payload)?;
        if body.is_empty() {
            return Err(QueueError::EmptyBody);
        }

        let url = self.registry.resolve(self.queue.as_ref(), queue_name).await?;
        let mut attributes = self.attributes.clone();
        attributes.insert(
            MESSAGE_TYPE_ATTRIBUTE.to_string(),
            std::any::type_name::<T>().to_string(),
        );

        let size = body.len() + attributes_size(&attributes);
        if size > self.threshold {
            let blobs = self.blobs.as_ref().ok_or(QueueError::PayloadTooLarge {
                size,
                threshold: self.threshold,
            })?;
            let key = blobs.put(&body).await?;
            debug!(%key, size, "offloaded message body");
            attributes.insert(RESERVED_ATTRIBUTE_NAME.to_string(), body.len().to_string());
            body = format!("{REFERENCE_MARKER}{key}");
        }

        self.queue.send(&url, body, attributes).await
    }

    /// Receive and decode up to `max_messages` payloads of type `T`
    ///
    /// Messages of another type, or without any of this manager's custom
    /// attributes, are skipped and left in flight. Undecodable messages are
    /// logged and skipped.
    #[instrument(skip(self))]
    pub async fn receive<T: DeserializeOwned>(
        &self,
        queue_name: &str,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage<T>>, QueueError> {
        let url = self.registry.resolve(self.queue.as_ref(), queue_name).await?;
        let messages = self.queue.receive(&url, max_messages).await?;

        let expected_type = std::any::type_name::<T>();
        let mut received = Vec::with_capacity(messages.len());
        for mut message in messages {
            if let Some(type_name) = message.attributes.get(MESSAGE_TYPE_ATTRIBUTE) {
                if type_name != expected_type {
                    trace!(%type_name, %expected_type, "skipping message of another type");
                    continue;
                }
            }
            if !self.attributes.is_empty()
                && !self
                    .attributes
                    .keys()
                    .any(|k| message.attributes.contains_key(k))
            {
                trace!(message_id = %message.message_id, "skipping message without attributes");
                continue;
            }

            let mut blob_key = None;
            if message.attributes.remove(RESERVED_ATTRIBUTE_NAME).is_some() {
                if let (Some(blobs), Some(key)) =
                    (&self.blobs, message.body.strip_prefix(REFERENCE_MARKER))
                {
                    let key = key.to_string();
                    message.body = blobs.get(&key).await?;
                    blob_key = Some(key);
                }
            }

            match serde_json::from_str(&message.body) {
                Ok(payload) => received.push(ReceivedMessage {
                    payload,
                    receipt_handle: message.receipt_handle,
                    attributes: message.attributes,
                    blob_key,
                }),
                Err(e) => {
                    warn!(message_id = %message.message_id, error = %e, "undecodable message");
                }
            }
        }
        Ok(received)
    }

    /// Delete a message by receipt handle
    pub async fn delete(&self, queue_name: &str, receipt_handle: &str) -> Result<(), QueueError> {
        if receipt_handle.is_empty() {
            return Err(QueueError::EmptyReceipt);
        }
        let url = self.registry.resolve(self.queue.as_ref(), queue_name).await?;
        self.queue.delete(&url, receipt_handle).await
    }

    /// Delete a received message and its offloaded body
    pub async fn acknowledge<T>(
        &self,
        queue_name: &str,
        message: &ReceivedMessage<T>,
    ) -> Result<(), QueueError> {
        self.delete(queue_name, &message.receipt_handle).await?;
        if let (Some(blobs), Some(key)) = (&self.blobs, &message.blob_key) {
            blobs.delete(key).await?;
        }
        Ok(())
    }
}

fn is_reserved(name: &str) -> bool {
    [RESERVED_ATTRIBUTE_NAME, MESSAGE_TYPE_ATTRIBUTE, REFERENCE_MARKER]
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

fn attributes_size(attributes: &BTreeMap<String, String>) -> usize {
    attributes.iter().map(|(k, v)| k.len() + v.len()).sum()
}
