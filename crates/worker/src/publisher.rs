//! Result publishing.
//!
//! Order matters: both artifacts are uploaded before the RUNNING ->
//! COMPLETED write, so a reader that sees COMPLETED can always fetch them.
//! Local files are removed only after that write is applied.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gas_core::naming;
use gas_core::storage::{ObjectStore, StorageError};
use gas_core::store::WriteOutcome;

use crate::state::{CompletedArtifacts, JobStateClient, StateError};
use crate::workspace::{JobFiles, WorkspaceManager};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to upload {} to s3://{bucket}/{key}: {source}", .path.display())]
    Upload {
        path: PathBuf,
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Artifact has no usable file name: {}", .0.display())]
    BadArtifactName(PathBuf),

    #[error("Failed to record completion: {0}")]
    State(#[from] StateError),
}

/// Result of a publish that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Artifacts uploaded and the job is COMPLETED.
    Completed(CompletedArtifacts),
    /// Artifacts uploaded but the job had already left RUNNING.
    Conflict,
}

pub struct ResultPublisher {
    storage: Arc<dyn ObjectStore>,
    state: Arc<JobStateClient>,
    workspace: Arc<WorkspaceManager>,
}

impl ResultPublisher {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        state: Arc<JobStateClient>,
        workspace: Arc<WorkspaceManager>,
    ) -> Self {
        Self {
            storage,
            state,
            workspace,
        }
    }

    /// Upload `files.result` and `files.log` under `dest_prefix` in
    /// `dest_bucket`, mark `job_id` COMPLETED, then clean up.
    ///
    /// On an upload failure nothing is written to the store and the job
    /// stays RUNNING.
    pub async fn publish(
        &self,
        job_id: &str,
        user_id: &str,
        files: &JobFiles,
        dest_bucket: &str,
        dest_prefix: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let result_key = self.upload(&files.result, dest_bucket, dest_prefix).await?;
        let log_key = self.upload(&files.log, dest_bucket, dest_prefix).await?;

        let artifacts = CompletedArtifacts {
            bucket: dest_bucket.to_string(),
            result_key,
            log_key,
        };

        match self.state.complete(job_id, artifacts.clone()).await? {
            WriteOutcome::Applied => {
                let removed = self.workspace.cleanup(user_id, &files.file_names()).await;
                tracing::info!(
                    job_id,
                    user_id,
                    bucket = dest_bucket,
                    result_key = %artifacts.result_key,
                    log_key = %artifacts.log_key,
                    files_removed = removed,
                    "Job completed",
                );
                Ok(PublishOutcome::Completed(artifacts))
            }
            WriteOutcome::Conflict => Ok(PublishOutcome::Conflict),
        }
    }

    async fn upload(&self, path: &Path, bucket: &str, prefix: &str) -> Result<String, PublishError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PublishError::BadArtifactName(path.to_path_buf()))?;
        let key = naming::object_key(prefix, name);

        self.storage
            .upload(path, bucket, &key)
            .await
            .map_err(|source| PublishError::Upload {
                path: path.to_path_buf(),
                bucket: bucket.to_string(),
                key: key.clone(),
                source,
            })?;

        tracing::debug!(bucket, key = %key, "Artifact uploaded");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gas_core::job::{JobRecord, JobRequest, JobStatus};
    use gas_core::memory::{MemoryJobStore, MemoryObjectStore};
    use gas_core::retry::RetryPolicy;
    use gas_core::store::{ConditionalWrite, JobStore};

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Arc<MemoryObjectStore>,
        store: Arc<MemoryJobStore>,
        publisher: ResultPublisher,
        files: JobFiles,
    }

    /// A RUNNING job with both artifacts written to the workspace.
    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(MemoryJobStore::new());

        let request = JobRequest {
            job_id: "abc123".into(),
            user_id: "u1".into(),
            input_file_name: "sample.vcf".into(),
            input_bucket: "in-bucket".into(),
            input_object_key: "u1/abc123~sample.vcf".into(),
        };
        let write = ConditionalWrite::create(JobRecord::pending(&request, 1)).unwrap();
        store.conditional_put("abc123", write).await.unwrap();

        let state = Arc::new(JobStateClient::new(store.clone(), RetryPolicy::no_retry()));
        state.claim("abc123").await.unwrap();

        let workspace = Arc::new(WorkspaceManager::new(dir.path(), storage.clone()));
        let user_dir = workspace.user_dir("u1");
        std::fs::create_dir_all(&user_dir).unwrap();
        let files = JobFiles::for_input(&user_dir.join("abc123~sample.vcf")).unwrap();
        std::fs::write(&files.input, "input").unwrap();
        std::fs::write(&files.result, "result").unwrap();
        std::fs::write(&files.log, "log").unwrap();

        let publisher = ResultPublisher::new(storage.clone(), state, workspace);
        Fixture {
            _dir: dir,
            storage,
            store,
            publisher,
            files,
        }
    }

    #[tokio::test]
    async fn uploads_then_completes_then_cleans_up() {
        let fx = fixture().await;

        let outcome = fx
            .publisher
            .publish("abc123", "u1", &fx.files, "results", "cnet/out")
            .await
            .unwrap();

        assert_matches!(outcome, PublishOutcome::Completed(a) if a.result_key == "cnet/out/abc123~sample.annot.vcf");
        assert_eq!(
            fx.storage.object("results", "cnet/out/abc123~sample.annot.vcf").await.as_deref(),
            Some(b"result".as_slice())
        );
        assert_eq!(
            fx.storage.object("results", "cnet/out/abc123~sample.count.log").await.as_deref(),
            Some(b"log".as_slice())
        );

        let record = fx.store.get("abc123").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.log_object_key.as_deref(), Some("cnet/out/abc123~sample.count.log"));

        assert!(!fx.files.input.exists());
        assert!(!fx.files.result.exists());
        assert!(!fx.files.log.exists());
    }

    #[tokio::test]
    async fn log_upload_failure_leaves_job_running_and_files_in_place() {
        let fx = fixture().await;
        fx.storage.fail_uploads_ending_with(".count.log").await;

        let result = fx
            .publisher
            .publish("abc123", "u1", &fx.files, "results", "")
            .await;

        assert_matches!(result, Err(PublishError::Upload { key, .. }) if key == "abc123~sample.count.log");
        let record = fx.store.get("abc123").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.result_object_key.is_none());
        assert!(fx.files.result.exists());
        assert!(fx.files.log.exists());
    }

    #[tokio::test]
    async fn job_no_longer_running_is_conflict_and_keeps_files() {
        let fx = fixture().await;
        fx.publisher
            .publish("abc123", "u1", &fx.files, "results", "")
            .await
            .unwrap();
        std::fs::write(&fx.files.result, "result").unwrap();
        std::fs::write(&fx.files.log, "log").unwrap();

        let outcome = fx
            .publisher
            .publish("abc123", "u1", &fx.files, "results", "")
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Conflict);
        assert!(fx.files.result.exists());
    }
}
