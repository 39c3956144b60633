//! In-memory queue for tests and local runs

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{MessageQueue, QueueError, QueueMessage};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    /// receipt handle -> message, received but not yet deleted
    in_flight: HashMap<String, QueueMessage>,
}

/// Queue keeping messages in process memory
///
/// Received messages stay in flight until deleted; there is no visibility
/// timeout, so undeleted messages are never redelivered.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    resolve_calls: AtomicU32,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of url resolutions served
    pub fn resolve_calls(&self) -> u32 {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// Messages waiting to be received
    pub fn ready_count(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .get(queue_url)
            .map(|q| q.ready.len())
            .unwrap_or_default()
    }

    /// Messages received but not deleted
    pub fn in_flight_count(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .get(queue_url)
            .map(|q| q.in_flight.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn resolve_url(&self, queue_name: &str) -> Result<String, QueueError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let url = format!("memory://{queue_name}");
        self.queues.lock().entry(url.clone()).or_default();
        Ok(url)
    }

    async fn send(
        &self,
        queue_url: &str,
        body: String,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, QueueError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::QueueNotFound(queue_url.to_string()))?;

        let message_id = Uuid::now_v7().to_string();
        queue.ready.push_back(QueueMessage {
            message_id: message_id.clone(),
            receipt_handle: String::new(),
            body,
            attributes,
        });
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::QueueNotFound(queue_url.to_string()))?;

        let count = max_messages.min(queue.ready.len());
        let mut received = Vec::with_capacity(count);
        for mut message in queue.ready.drain(..count).collect::<Vec<_>>() {
            message.receipt_handle = Uuid::now_v7().to_string();
            queue
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
            received.push(message);
        }
        Ok(received)
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::QueueNotFound(queue_url.to_string()))?;

        queue
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::Backend(format!("unknown receipt handle {receipt_handle}")))
    }
}
