//! SQS-backed [`RequestQueue`].

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use gas_core::queue::{QueueError, QueueMessage, RequestQueue};

/// Longest long-poll wait SQS accepts.
const MAX_WAIT_SECS: u64 = 20;

#[derive(Clone)]
pub struct SqsRequestQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsRequestQueue {
    pub fn new(config: &aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_sqs::Client::new(config),
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl RequestQueue for SqsRequestQueue {
    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let wait_secs = wait.as_secs().min(MAX_WAIT_SECS) as i32;
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.clamp(1, 10))
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(&e).to_string()))?;

        let mut messages = Vec::new();
        for message in output.messages.unwrap_or_default() {
            // A delivery without a receipt handle cannot be acknowledged.
            let Some(receipt_handle) = message.receipt_handle else {
                tracing::warn!(message_id = ?message.message_id, "Received message without receipt handle");
                continue;
            };
            messages.push(QueueMessage {
                message_id: message.message_id.unwrap_or_default(),
                receipt_handle,
                body: message.body.unwrap_or_default(),
            });
        }
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
