//! Job state store client.
//!
//! Wraps the [`JobStore`] with bounded retries for unavailable-store errors
//! and the three transitions the worker makes. A [`WriteOutcome::Conflict`]
//! is an ordinary result meaning another delivery owns the job.

use std::sync::Arc;

use gas_core::error::CoreError;
use gas_core::job::{JobRecord, JobStatus};
use gas_core::retry::RetryPolicy;
use gas_core::store::{ConditionalWrite, JobStore, StoreError, TransitionFields, WriteOutcome};
use gas_core::types::now_epoch_secs;

/// Longest failure reason stored on a FAILED record.
const MAX_FAILURE_REASON_CHARS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rejected(#[from] CoreError),
}

/// Where a completed job's artifacts were uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedArtifacts {
    pub bucket: String,
    pub result_key: String,
    pub log_key: String,
}

pub struct JobStateClient {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl JobStateClient {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StateError> {
        let store = &self.store;
        let record = self
            .retry
            .retry("get_job", StoreError::is_retryable, move || store.get(job_id))
            .await?;
        Ok(record)
    }

    /// Move `job_id` from `from` to `to` if its status is still `from`.
    pub async fn transition(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<WriteOutcome, StateError> {
        let write = ConditionalWrite::transition(from, to, fields)?;
        let store = &self.store;

        let outcome = self
            .retry
            .retry("transition_job", StoreError::is_retryable, move || {
                let write = write.clone();
                async move { store.conditional_put(job_id, write).await }
            })
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                tracing::debug!(job_id, from = %from, to = %to, "Job status updated");
            }
            WriteOutcome::Conflict => {
                tracing::info!(job_id, from = %from, to = %to, "Job not in expected status, transition skipped");
            }
        }
        Ok(outcome)
    }

    /// PENDING -> RUNNING.
    pub async fn claim(&self, job_id: &str) -> Result<WriteOutcome, StateError> {
        self.transition(
            job_id,
            JobStatus::Pending,
            JobStatus::Running,
            TransitionFields::default(),
        )
        .await
    }

    /// RUNNING -> COMPLETED, recording where the artifacts are.
    pub async fn complete(
        &self,
        job_id: &str,
        artifacts: CompletedArtifacts,
    ) -> Result<WriteOutcome, StateError> {
        let fields = TransitionFields {
            complete_time: Some(now_epoch_secs()),
            result_bucket: Some(artifacts.bucket),
            result_object_key: Some(artifacts.result_key),
            log_object_key: Some(artifacts.log_key),
            failure_reason: None,
        };
        self.transition(job_id, JobStatus::Running, JobStatus::Completed, fields)
            .await
    }

    /// RUNNING -> FAILED with a diagnostic reason.
    pub async fn fail(&self, job_id: &str, reason: &str) -> Result<WriteOutcome, StateError> {
        let fields = TransitionFields {
            complete_time: Some(now_epoch_secs()),
            failure_reason: Some(truncate(reason, MAX_FAILURE_REASON_CHARS)),
            ..TransitionFields::default()
        };
        self.transition(job_id, JobStatus::Running, JobStatus::Failed, fields)
            .await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
