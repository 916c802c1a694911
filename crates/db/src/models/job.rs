//! Row model for the `annotations` table.

use gas_core::error::CoreError;
use gas_core::job::{JobRecord, JobStatus};
use sqlx::FromRow;

/// A row from the `annotations` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub user_id: String,
    pub input_file_name: String,
    pub s3_input_bucket: String,
    pub s3_key_input_file: String,
    pub job_status: String,
    pub submit_time: i64,
    pub complete_time: Option<i64>,
    pub s3_results_bucket: Option<String>,
    pub s3_key_result_file: Option<String>,
    pub s3_key_log_file: Option<String>,
    pub failure_reason: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.job_status.parse()?;
        Ok(JobRecord {
            job_id: row.job_id,
            user_id: row.user_id,
            input_file_name: row.input_file_name,
            input_bucket: row.s3_input_bucket,
            input_object_key: row.s3_key_input_file,
            status,
            submit_time: row.submit_time,
            complete_time: row.complete_time,
            result_bucket: row.s3_results_bucket,
            result_object_key: row.s3_key_result_file,
            log_object_key: row.s3_key_log_file,
            failure_reason: row.failure_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> JobRow {
        JobRow {
            job_id: "abc123".into(),
            user_id: "u1".into(),
            input_file_name: "sample.vcf".into(),
            s3_input_bucket: "in-bucket".into(),
            s3_key_input_file: "u1/abc123~sample.vcf".into(),
            job_status: status.into(),
            submit_time: 10,
            complete_time: None,
            s3_results_bucket: None,
            s3_key_result_file: None,
            s3_key_log_file: None,
            failure_reason: None,
        }
    }

    #[test]
    fn row_maps_to_record() {
        let record = JobRecord::try_from(row("RUNNING")).unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.input_bucket, "in-bucket");
        assert_eq!(record.input_object_key, "u1/abc123~sample.vcf");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(JobRecord::try_from(row("ARCHIVED")).is_err());
    }
}
