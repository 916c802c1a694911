//! Job notification publishing (producer side).

use async_trait::async_trait;

use crate::job::JobRequest;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to encode notification: {0}")]
    Encode(String),

    #[error("Failed to publish notification: {0}")]
    Publish(String),
}

/// Publishes job requests to the topic that fans out to the request queue.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, request: &JobRequest) -> Result<(), NotifyError>;
}
