//! Request queue capability.
//!
//! The queue delivers at least once. Deleting a message by its receipt
//! handle is the only acknowledgment; an undeleted message becomes
//! visible again after the queue's visibility timeout.

use std::time::Duration;

use async_trait::async_trait;

/// A message as received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Handle for this delivery; required to delete the message.
    pub receipt_handle: String,
    pub body: String,
}

/// Errors returned by a [`RequestQueue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Delete failed: {0}")]
    Delete(String),
}

#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Long-poll for up to `max_messages`, waiting at most `wait` for the
    /// first one to arrive. An empty vector means the wait elapsed.
    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a delivery.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;
}
