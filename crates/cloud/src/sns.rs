//! SNS-backed [`Notifier`].
//!
//! SNS wraps the published message in its own envelope on delivery to a
//! subscribed queue, which is the shape the worker parses.

use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use gas_core::envelope::{self, NOTIFICATION_SUBJECT};
use gas_core::job::JobRequest;
use gas_core::notify::{NotifyError, Notifier};

#[derive(Clone)]
pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(config: &aws_config::SdkConfig, topic_arn: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_sns::Client::new(config),
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, request: &JobRequest) -> Result<(), NotifyError> {
        let message =
            envelope::request_message(request).map_err(|e| NotifyError::Encode(e.to_string()))?;

        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(NOTIFICATION_SUBJECT)
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError::Publish(DisplayErrorContext(&e).to_string()))?;

        tracing::debug!(
            job_id = %request.job_id,
            message_id = ?output.message_id(),
            "Published job request",
        );
        Ok(())
    }
}
