//! Job submission: the producer side of the request queue.
//!
//! After an input file has been uploaded to
//! `<prefix>/<user_id>/<job_id>~<file_name>`, [`JobSubmitter::submit`]
//! records the job as PENDING and publishes the request notification.
//! The record is created before the notification so a worker never
//! receives a request for a job that does not exist yet.

use std::sync::Arc;

use crate::error::CoreError;
use crate::job::{JobRecord, JobRequest};
use crate::naming;
use crate::notify::{Notifier, NotifyError};
use crate::store::{ConditionalWrite, JobStore, StoreError, WriteOutcome};
use crate::types::now_epoch_secs;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Job {0} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Mint a new job id and return `(job_id, input key)` for an upload.
pub fn new_input_key(prefix: &str, user_id: &str, file_name: &str) -> (String, String) {
    let job_id = uuid::Uuid::new_v4().to_string();
    let key = naming::input_object_key(prefix, user_id, &job_id, file_name);
    (job_id, key)
}

pub struct JobSubmitter {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
}

impl JobSubmitter {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create the PENDING record for the uploaded object at
    /// `(bucket, key)` and publish its request.
    pub async fn submit(&self, bucket: &str, key: &str) -> Result<JobRequest, SubmitError> {
        let parts = naming::parse_input_object_key(key)?;
        let request = JobRequest {
            job_id: parts.job_id,
            user_id: parts.user_id,
            input_file_name: parts.file_name,
            input_bucket: bucket.to_string(),
            input_object_key: key.to_string(),
        };
        request.validate()?;

        let record = JobRecord::pending(&request, now_epoch_secs());
        let write = ConditionalWrite::create(record)?;
        match self.store.conditional_put(&request.job_id, write).await? {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => return Err(SubmitError::Duplicate(request.job_id)),
        }

        self.notifier.publish(&request).await?;

        tracing::info!(
            job_id = %request.job_id,
            user_id = %request.user_id,
            key,
            "Job submitted",
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::envelope;
    use crate::job::JobStatus;
    use crate::memory::{MemoryJobStore, MemoryNotifier, MemoryQueue};
    use crate::queue::RequestQueue;

    #[test]
    fn new_input_key_embeds_fresh_job_id() {
        let (job_id, key) = new_input_key("cnet", "u1", "sample.vcf");
        assert_eq!(key, format!("cnet/u1/{job_id}~sample.vcf"));

        let (other, _) = new_input_key("cnet", "u1", "sample.vcf");
        assert_ne!(job_id, other);
    }

    #[tokio::test]
    async fn submit_creates_pending_record_and_notifies() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let notifier = Arc::new(MemoryNotifier::fan_out_to(Arc::clone(&queue)));
        let submitter = JobSubmitter::new(store.clone(), notifier.clone());

        let request = submitter
            .submit("in-bucket", "cnet/u1/abc123~sample.vcf")
            .await
            .unwrap();
        assert_eq!(request.job_id, "abc123");
        assert_eq!(request.user_id, "u1");

        let record = store.get("abc123").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.submit_time > 0);

        let delivered = queue.receive(10, std::time::Duration::ZERO).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(envelope::parse_job_request(&delivered[0].body).unwrap(), request);
        assert_eq!(notifier.published().await.len(), 1);
    }

    #[tokio::test]
    async fn resubmitting_same_job_is_rejected() {
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let submitter = JobSubmitter::new(store, notifier.clone());

        submitter.submit("b", "u1/abc~a.vcf").await.unwrap();
        let second = submitter.submit("b", "u1/abc~a.vcf").await;

        assert_matches!(second, Err(SubmitError::Duplicate(id)) if id == "abc");
        assert_eq!(notifier.published().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_key_is_rejected_before_any_write() {
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let submitter = JobSubmitter::new(store.clone(), notifier.clone());

        let result = submitter.submit("b", "no-user-segment.vcf").await;

        assert_matches!(result, Err(SubmitError::Invalid(_)));
        assert_eq!(store.len().await, 0);
        assert!(notifier.published().await.is_empty());
    }
}
