//! Per-user local staging directories.
//!
//! Layout: `<root>/<user_id>/<job_id>~<file_name>` for the staged input,
//! with the pipeline's result and log files written beside it, and a
//! `<base>.done` marker once the pipeline has succeeded. Directories
//! are created lazily and the files are only removed after a successful
//! publish, so a failed job's files stay behind for diagnosis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gas_core::error::CoreError;
use gas_core::naming;
use gas_core::storage::{ObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Failed to create workspace directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download s3://{bucket}/{key}: {source}")]
    Download {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Local paths of one job's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    pub input: PathBuf,
    pub result: PathBuf,
    pub log: PathBuf,
    /// Present only after the pipeline succeeded on this host.
    pub done: PathBuf,
}

impl JobFiles {
    /// Derive the artifact paths from a staged input path.
    pub fn for_input(input: &Path) -> Result<Self, CoreError> {
        let (result, log) = naming::artifact_paths(input)?;
        let done = input.with_file_name(naming::done_file_name(&file_name(input)));
        Ok(Self {
            input: input.to_path_buf(),
            result,
            log,
            done,
        })
    }

    /// File names of every file the job can leave behind, for
    /// [`WorkspaceManager::cleanup`].
    pub fn file_names(&self) -> Vec<String> {
        [&self.input, &self.result, &self.log, &self.done]
            .into_iter()
            .map(|p| file_name(p))
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Record that the pipeline exited cleanly with both artifacts.
    pub async fn mark_run_succeeded(&self) -> std::io::Result<()> {
        tokio::fs::write(&self.done, b"").await
    }

    /// Whether a finished successful run left publishable artifacts.
    ///
    /// Artifacts without the marker belong to a run that is still going or
    /// that failed, and must never be published.
    pub async fn run_succeeded(&self) -> bool {
        for path in [&self.done, &self.result, &self.log] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct WorkspaceManager {
    root: PathBuf,
    storage: Arc<dyn ObjectStore>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            root: root.into(),
            storage,
        }
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(user_id)
    }

    /// Where the input for `job_id` is staged.
    pub fn input_path(&self, user_id: &str, job_id: &str, file_name: &str) -> PathBuf {
        self.user_dir(user_id)
            .join(naming::job_file_name(job_id, file_name))
    }

    /// Download `(bucket, key)` into the user's directory as
    /// `<job_id>~<file_name>` and return the local path.
    ///
    /// Restaging an already staged input overwrites it.
    pub async fn stage(
        &self,
        job_id: &str,
        user_id: &str,
        file_name: &str,
        bucket: &str,
        key: &str,
    ) -> Result<PathBuf, StagingError> {
        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        let dest = self.input_path(user_id, job_id, file_name);
        self.storage
            .download(bucket, key, &dest)
            .await
            .map_err(|source| StagingError::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        tracing::debug!(job_id, user_id, path = %dest.display(), "Input staged");
        Ok(dest)
    }

    /// Best-effort removal of `file_names` from the user's directory.
    ///
    /// Returns how many files were removed. Failures are logged and
    /// otherwise ignored; a file that is already gone is not a failure.
    pub async fn cleanup(&self, user_id: &str, file_names: &[String]) -> usize {
        let dir = self.user_dir(user_id);
        let mut removed = 0;
        for name in file_names {
            let path = dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(user_id, path = %path.display(), error = %e, "Failed to remove workspace file");
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gas_core::memory::MemoryObjectStore;

    use super::*;

    async fn manager_with_input() -> (tempfile::TempDir, WorkspaceManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryObjectStore::new());
        storage
            .put_object("in-bucket", "u1/abc123~sample.vcf", "##fileformat=VCFv4.1\n")
            .await;
        let manager = WorkspaceManager::new(dir.path().join("jobs"), storage);
        (dir, manager)
    }

    #[tokio::test]
    async fn stage_creates_user_dir_and_names_file_by_job() {
        let (dir, manager) = manager_with_input().await;

        let path = manager
            .stage("abc123", "u1", "sample.vcf", "in-bucket", "u1/abc123~sample.vcf")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("jobs/u1/abc123~sample.vcf"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "##fileformat=VCFv4.1\n");
    }

    #[tokio::test]
    async fn restaging_is_harmless() {
        let (_dir, manager) = manager_with_input().await;
        for _ in 0..2 {
            manager
                .stage("abc123", "u1", "sample.vcf", "in-bucket", "u1/abc123~sample.vcf")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn missing_object_is_download_error() {
        let (_dir, manager) = manager_with_input().await;

        let result = manager
            .stage("zzz", "u1", "other.vcf", "in-bucket", "u1/zzz~other.vcf")
            .await;

        assert_matches!(
            result,
            Err(StagingError::Download { source: StorageError::NotFound { .. }, .. })
        );
    }

    #[tokio::test]
    async fn unwritable_root_is_create_dir_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let manager = WorkspaceManager::new(&blocker, Arc::new(MemoryObjectStore::new()));

        let result = manager.stage("j", "u1", "a.vcf", "b", "u1/j~a.vcf").await;

        assert_matches!(result, Err(StagingError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn cleanup_skips_missing_files() {
        let (_dir, manager) = manager_with_input().await;
        let input = manager
            .stage("abc123", "u1", "sample.vcf", "in-bucket", "u1/abc123~sample.vcf")
            .await
            .unwrap();
        let files = JobFiles::for_input(&input).unwrap();
        std::fs::write(&files.result, "r").unwrap();

        let removed = manager.cleanup("u1", &files.file_names()).await;

        assert_eq!(removed, 2);
        assert!(!files.input.exists());
        assert!(!files.result.exists());
    }

    #[tokio::test]
    async fn run_succeeded_requires_marker_and_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::for_input(&dir.path().join("abc123~sample.vcf")).unwrap();
        assert_eq!(
            files.file_names(),
            vec![
                "abc123~sample.vcf",
                "abc123~sample.annot.vcf",
                "abc123~sample.count.log",
                "abc123~sample.done",
            ]
        );

        std::fs::write(&files.result, "r").unwrap();
        std::fs::write(&files.log, "l").unwrap();
        assert!(!files.run_succeeded().await);

        files.mark_run_succeeded().await.unwrap();
        assert!(files.run_succeeded().await);

        std::fs::remove_file(&files.log).unwrap();
        assert!(!files.run_succeeded().await);
    }
}
