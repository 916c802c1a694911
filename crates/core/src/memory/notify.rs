use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::MemoryQueue;
use crate::envelope;
use crate::job::JobRequest;
use crate::notify::{Notifier, NotifyError};

/// A [`Notifier`] that records published requests and optionally fans
/// them out to a [`MemoryQueue`] wrapped in a notification envelope.
#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<JobRequest>>,
    queue: Option<Arc<MemoryQueue>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every published request to `queue`.
    pub fn fan_out_to(queue: Arc<MemoryQueue>) -> Self {
        Self {
            published: Mutex::default(),
            queue: Some(queue),
        }
    }

    pub async fn published(&self) -> Vec<JobRequest> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, request: &JobRequest) -> Result<(), NotifyError> {
        if let Some(queue) = &self.queue {
            let body = envelope::wrap_notification(request)
                .map_err(|e| NotifyError::Encode(e.to_string()))?;
            queue.push(body).await;
        }
        self.published.lock().await.push(request.clone());
        Ok(())
    }
}
