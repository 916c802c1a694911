//! Job metadata store capability.
//!
//! The store exposes exactly two operations: a keyed [`JobStore::get`] and
//! a [`JobStore::conditional_put`]. There is no unconditional overwrite.
//! A [`ConditionalWrite`] can only be built through constructors that
//! check the state machine, so an illegal transition cannot be expressed.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::job::{JobRecord, JobStatus};
use crate::types::EpochSecs;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors returned by a [`JobStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached. Retrying may succeed.
    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but the request or stored data is unusable.
    #[error("Job store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Extra columns set alongside a status transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionFields {
    pub complete_time: Option<EpochSecs>,
    pub result_bucket: Option<String>,
    pub result_object_key: Option<String>,
    pub log_object_key: Option<String>,
    pub failure_reason: Option<String>,
}

/// The precondition and payload of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    /// Insert `record`; applies only if no record with its `job_id` exists.
    Create(JobRecord),
    /// Move the record from `from` to `to`; applies only if its current
    /// status equals `from`.
    Transition {
        from: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    },
}

/// A validated conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalWrite {
    kind: WriteKind,
}

impl ConditionalWrite {
    /// Create a record. The record must be PENDING.
    pub fn create(record: JobRecord) -> Result<Self, CoreError> {
        if record.status != JobStatus::Pending {
            return Err(CoreError::Validation(format!(
                "New job records must be {}, got {}",
                JobStatus::Pending,
                record.status
            )));
        }
        Ok(Self {
            kind: WriteKind::Create(record),
        })
    }

    /// Transition a record from `from` to `to`.
    ///
    /// Fails with [`CoreError::IllegalTransition`] for any pair outside the
    /// state machine.
    pub fn transition(
        from: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<Self, CoreError> {
        from.validate_transition(to)?;
        Ok(Self {
            kind: WriteKind::Transition { from, to, fields },
        })
    }

    pub fn kind(&self) -> &WriteKind {
        &self.kind
    }

    pub fn into_kind(self) -> WriteKind {
        self.kind
    }
}

/// Result of a conditional write that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The precondition held and the write was applied.
    Applied,
    /// The precondition did not hold; nothing was written.
    Conflict,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Keyed, conditionally-updated job metadata.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch the record for `job_id`, if any.
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Apply `write` to the record for `job_id` if its precondition holds.
    ///
    /// A failed precondition is [`WriteOutcome::Conflict`], not an error.
    async fn conditional_put(
        &self,
        job_id: &str,
        write: ConditionalWrite,
    ) -> Result<WriteOutcome, StoreError>;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::job::JobRequest;

    #[test]
    fn illegal_transitions_cannot_be_built() {
        for from in JobStatus::ALL {
            for to in JobStatus::ALL {
                let result = ConditionalWrite::transition(from, to, TransitionFields::default());
                assert_eq!(result.is_ok(), from.can_transition(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn create_requires_pending_record() {
        let request = JobRequest {
            job_id: "j".into(),
            user_id: "u".into(),
            input_file_name: "f.vcf".into(),
            input_bucket: "b".into(),
            input_object_key: "u/j~f.vcf".into(),
        };
        let mut record = JobRecord::pending(&request, 1);
        assert!(ConditionalWrite::create(record.clone()).is_ok());

        record.status = JobStatus::Completed;
        assert_matches!(
            ConditionalWrite::create(record),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::Unavailable("timeout".into()).is_retryable());
        assert!(!StoreError::Backend("bad row".into()).is_retryable());
    }
}
