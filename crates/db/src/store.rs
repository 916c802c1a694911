//! [`JobStore`] implementation over Postgres.

use async_trait::async_trait;
use gas_core::job::JobRecord;
use gas_core::store::{ConditionalWrite, JobStore, StoreError, WriteKind, WriteOutcome};

use crate::repositories::JobRepo;
use crate::DbPool;

/// Postgres-backed job metadata store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let row = JobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(classify_sqlx_error)?;
        row.map(JobRecord::try_from)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn conditional_put(
        &self,
        job_id: &str,
        write: ConditionalWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let applied = match write.kind() {
            WriteKind::Create(record) => {
                if record.job_id != job_id {
                    return Err(StoreError::Backend(format!(
                        "Record id {} does not match key {job_id}",
                        record.job_id
                    )));
                }
                JobRepo::insert_if_absent(&self.pool, record).await
            }
            WriteKind::Transition { from, to, fields } => {
                JobRepo::transition(&self.pool, job_id, *from, *to, fields).await
            }
        }
        .map_err(classify_sqlx_error)?;

        if applied {
            Ok(WriteOutcome::Applied)
        } else {
            tracing::debug!(job_id, "Conditional write precondition failed");
            Ok(WriteOutcome::Conflict)
        }
    }
}

/// Split sqlx errors into retryable connectivity failures and the rest.
fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_retryable() {
        assert!(classify_sqlx_error(sqlx::Error::PoolTimedOut).is_retryable());
        let io = sqlx::Error::Io(std::io::Error::other("reset"));
        assert!(classify_sqlx_error(io).is_retryable());
    }

    #[test]
    fn row_errors_are_not_retryable() {
        assert!(!classify_sqlx_error(sqlx::Error::RowNotFound).is_retryable());
    }
}
