//! Queue message envelope handling.
//!
//! A request reaches the queue through a notification topic, so the queue
//! message body is a notification envelope whose `Message` field holds the
//! [`JobRequest`] serialized as a JSON string:
//!
//! ```text
//! body = {"Type": "Notification", "Subject": "...", "Message": "{\"job_id\": ...}"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobRequest;

/// Subject line attached to published job notifications.
pub const NOTIFICATION_SUBJECT: &str = "Job Request Notification";

/// The outer notification envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "Subject", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "Message")]
    pub message: String,
}

/// Parse a queue message body into a validated [`JobRequest`].
///
/// Any failure (malformed JSON at either layer, a missing field, an empty
/// field) is a [`CoreError::Validation`].
pub fn parse_job_request(body: &str) -> Result<JobRequest, CoreError> {
    let envelope: NotificationEnvelope = serde_json::from_str(body)
        .map_err(|e| CoreError::Validation(format!("Malformed notification envelope: {e}")))?;

    let request: JobRequest = serde_json::from_str(&envelope.message)
        .map_err(|e| CoreError::Validation(format!("Malformed job request: {e}")))?;

    request.validate()?;
    Ok(request)
}

/// Serialize `request` as the JSON string carried in `Message`.
pub fn request_message(request: &JobRequest) -> Result<String, CoreError> {
    serde_json::to_string(request)
        .map_err(|e| CoreError::Internal(format!("Failed to serialize job request: {e}")))
}

/// Build the full envelope body the queue would deliver for `request`.
///
/// Used by in-memory fan-out and tests; the real topic builds its own.
pub fn wrap_notification(request: &JobRequest) -> Result<String, CoreError> {
    let envelope = NotificationEnvelope {
        kind: Some("Notification".to_string()),
        subject: Some(NOTIFICATION_SUBJECT.to_string()),
        message: request_message(request)?,
    };
    serde_json::to_string(&envelope)
        .map_err(|e| CoreError::Internal(format!("Failed to serialize envelope: {e}")))
}
