use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::queue::{QueueError, QueueMessage, RequestQueue};

#[derive(Default)]
struct QueueState {
    visible: VecDeque<(String, String)>,
    /// Receipt handle -> (message id, body) for received, undeleted messages.
    in_flight: HashMap<String, (String, String)>,
    deleted: Vec<String>,
}

/// A [`RequestQueue`] with at-least-once semantics.
///
/// Received messages stay in flight until deleted.
/// [`redeliver_in_flight`](Self::redeliver_in_flight) plays the role of
/// the visibility timeout expiring.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw message body and return its message id.
    pub async fn push(&self, body: impl Into<String>) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.state
            .lock()
            .await
            .visible
            .push_back((id.clone(), body.into()));
        id
    }

    /// Make every received-but-undeleted message visible again.
    pub async fn redeliver_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut pending: Vec<(String, String)> = state.in_flight.drain().map(|(_, m)| m).collect();
        pending.sort();
        let count = pending.len();
        state.visible.extend(pending);
        count
    }

    /// Message ids that were deleted, in deletion order.
    pub async fn deleted(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn visible_len(&self) -> usize {
        self.state.lock().await.visible.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl RequestQueue for MemoryQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        // Long poll: an empty queue holds the caller for `wait` once.
        if !wait.is_zero() && self.visible_len().await == 0 {
            tokio::time::sleep(wait).await;
        }

        let mut state = self.state.lock().await;
        let take = (max_messages.max(0) as usize).min(state.visible.len());

        let mut messages = Vec::with_capacity(take);
        for _ in 0..take {
            let Some((message_id, body)) = state.visible.pop_front() else {
                break;
            };
            let receipt_handle = format!(
                "{message_id}-r{}",
                self.next_id.fetch_add(1, Ordering::SeqCst)
            );
            state
                .in_flight
                .insert(receipt_handle.clone(), (message_id.clone(), body.clone()));
            messages.push(QueueMessage {
                message_id,
                receipt_handle,
                body,
            });
        }
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(receipt_handle) {
            Some((message_id, _)) => {
                state.deleted.push(message_id);
                Ok(())
            }
            None => Err(QueueError::Delete(format!(
                "Unknown receipt handle {receipt_handle}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_respects_max_messages() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.push(format!("body {i}")).await;
        }

        let batch = queue.receive(3, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].body, "body 0");
        assert_eq!(queue.visible_len().await, 2);
        assert_eq!(queue.in_flight_len().await, 3);
    }

    #[tokio::test]
    async fn undeleted_messages_are_redelivered() {
        let queue = MemoryQueue::new();
        let id = queue.push("body").await;

        let first = queue.receive(10, Duration::ZERO).await.unwrap();
        assert!(queue.receive(10, Duration::ZERO).await.unwrap().is_empty());

        assert_eq!(queue.redeliver_in_flight().await, 1);
        let second = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(second[0].message_id, id);
        assert_ne!(second[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test]
    async fn delete_acknowledges_by_receipt_handle() {
        let queue = MemoryQueue::new();
        let id = queue.push("body").await;
        let batch = queue.receive(1, Duration::ZERO).await.unwrap();

        queue.delete(&batch[0].receipt_handle).await.unwrap();

        assert_eq!(queue.deleted().await, vec![id]);
        assert_eq!(queue.redeliver_in_flight().await, 0);
        assert!(queue.delete(&batch[0].receipt_handle).await.is_err());
    }
}
