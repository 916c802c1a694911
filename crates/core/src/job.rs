//! Job request payload, job record, and the job status state machine.
//!
//! The legal transitions are:
//!
//! ```text
//! PENDING --claim--> RUNNING --publish--> COMPLETED
//!                    RUNNING --failure--> FAILED
//! ```
//!
//! COMPLETED and FAILED are terminal. Every other pair is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::EpochSecs;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an annotation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Stored representation (`"PENDING"`, `"RUNNING"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns `true` for COMPLETED and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if a write may move a record from `self` to `to`.
    pub fn can_transition(self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Validate a transition, returning [`CoreError::IllegalTransition`]
    /// for anything outside the state machine.
    pub fn validate_transition(self, to: JobStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition { from: self, to })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!("Unknown job status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// The job request carried inside a queue notification.
///
/// Field names on the wire follow the submitter's format
/// (`s3_input_bucket`, `s3_key_input_file`). Unknown fields such as
/// `submit_time` or `job_status` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
    pub user_id: String,
    pub input_file_name: String,
    #[serde(rename = "s3_input_bucket")]
    pub input_bucket: String,
    #[serde(rename = "s3_key_input_file")]
    pub input_object_key: String,
}

impl JobRequest {
    /// Check that every field is present and usable.
    ///
    /// `job_id`, `user_id`, and `input_file_name` become local path
    /// components, so they must also be single, non-traversing segments.
    pub fn validate(&self) -> Result<(), CoreError> {
        require_non_empty("job_id", &self.job_id)?;
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("input_file_name", &self.input_file_name)?;
        require_non_empty("s3_input_bucket", &self.input_bucket)?;
        require_non_empty("s3_key_input_file", &self.input_object_key)?;

        require_path_segment("job_id", &self.job_id)?;
        require_path_segment("user_id", &self.user_id)?;
        require_path_segment("input_file_name", &self.input_file_name)?;

        if self.job_id.contains('~') {
            return Err(CoreError::Validation(
                "job_id must not contain '~'".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::Validation(format!(
            "Required field '{field}' is empty"
        )))
    } else {
        Ok(())
    }
}

fn require_path_segment(field: &str, value: &str) -> Result<(), CoreError> {
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        Err(CoreError::Validation(format!(
            "Field '{field}' must be a single path segment, got '{value}'"
        )))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// A row of the job metadata table, keyed by `job_id`.
///
/// The submitter creates the record in PENDING; the worker advances it.
/// The result fields are populated only on reaching COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub user_id: String,
    pub input_file_name: String,
    pub input_bucket: String,
    pub input_object_key: String,
    pub status: JobStatus,
    pub submit_time: EpochSecs,
    pub complete_time: Option<EpochSecs>,
    pub result_bucket: Option<String>,
    pub result_object_key: Option<String>,
    pub log_object_key: Option<String>,
    /// Diagnostic text recorded on the transition to FAILED.
    pub failure_reason: Option<String>,
}

impl JobRecord {
    /// A freshly submitted record for `request`.
    pub fn pending(request: &JobRequest, submit_time: EpochSecs) -> Self {
        Self {
            job_id: request.job_id.clone(),
            user_id: request.user_id.clone(),
            input_file_name: request.input_file_name.clone(),
            input_bucket: request.input_bucket.clone(),
            input_object_key: request.input_object_key.clone(),
            status: JobStatus::Pending,
            submit_time,
            complete_time: None,
            result_bucket: None,
            result_object_key: None,
            log_object_key: None,
            failure_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
