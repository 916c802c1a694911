//! Repository for the `annotations` table.
//!
//! Every write is conditional. Creation is `INSERT ... ON CONFLICT DO
//! NOTHING`; a transition is an `UPDATE` guarded by the expected current
//! status. Callers learn whether the precondition held from the returned
//! `bool`.

use gas_core::job::{JobRecord, JobStatus};
use gas_core::store::TransitionFields;
use sqlx::PgPool;

use crate::models::job::JobRow;

/// Column list for `annotations` queries.
const COLUMNS: &str = "\
    job_id, user_id, input_file_name, s3_input_bucket, s3_key_input_file, \
    job_status, submit_time, complete_time, \
    s3_results_bucket, s3_key_result_file, s3_key_log_file, failure_reason";

pub struct JobRepo;

impl JobRepo {
    pub async fn find_by_id(pool: &PgPool, job_id: &str) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert `record` unless a row with its `job_id` exists.
    ///
    /// Returns `true` if the row was inserted.
    pub async fn insert_if_absent(pool: &PgPool, record: &JobRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO annotations \
                 (job_id, user_id, input_file_name, s3_input_bucket, s3_key_input_file, \
                  job_status, submit_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(&record.job_id)
        .bind(&record.user_id)
        .bind(&record.input_file_name)
        .bind(&record.input_bucket)
        .bind(&record.input_object_key)
        .bind(record.status.as_str())
        .bind(record.submit_time)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Move the job from `from` to `to` if its current status is `from`.
    ///
    /// `None` fields leave the column unchanged. Returns `true` if the row
    /// was updated.
    pub async fn transition(
        pool: &PgPool,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
        fields: &TransitionFields,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE annotations \
             SET job_status = $3, \
                 complete_time = COALESCE($4, complete_time), \
                 s3_results_bucket = COALESCE($5, s3_results_bucket), \
                 s3_key_result_file = COALESCE($6, s3_key_result_file), \
                 s3_key_log_file = COALESCE($7, s3_key_log_file), \
                 failure_reason = COALESCE($8, failure_reason) \
             WHERE job_id = $1 AND job_status = $2",
        )
        .bind(job_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(fields.complete_time)
        .bind(fields.result_bucket.as_deref())
        .bind(fields.result_object_key.as_deref())
        .bind(fields.log_object_key.as_deref())
        .bind(fields.failure_reason.as_deref())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
