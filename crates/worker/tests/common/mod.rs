//! Shared harness: a worker wired to in-memory capabilities, fed through
//! the same submitter a producer would use.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gas_core::job::{JobRecord, JobRequest};
use gas_core::memory::{
    MemoryJobStore, MemoryNotifier, MemoryObjectStore, MemoryQueue, StubBehavior, StubExecutor,
};
use gas_core::retry::RetryPolicy;
use gas_core::store::JobStore;
use gas_core::submit::JobSubmitter;
use gas_worker::publisher::ResultPublisher;
use gas_worker::state::JobStateClient;
use gas_worker::workspace::WorkspaceManager;
use gas_worker::{Dispatcher, JobProcessor};

pub const INPUT_BUCKET: &str = "in-bucket";
pub const RESULTS_BUCKET: &str = "gas-results";
pub const RESULT_PREFIX: &str = "cnet/results";
pub const VCF: &str = "##fileformat=VCFv4.1\nchr1\t100\t.\tA\tG\n";

/// Retries that do not slow tests down.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
        jitter: Duration::ZERO,
    }
}

/// One worker host: its own workspace and pipeline.
pub struct Host {
    pub workspace_root: PathBuf,
    pub executor: Arc<StubExecutor>,
    pub dispatcher: Dispatcher,
}

impl Host {
    pub fn staged(&self, user_id: &str, file_name: &str) -> PathBuf {
        self.workspace_root.join(user_id).join(file_name)
    }
}

/// Shared services plus any number of worker hosts.
pub struct Cluster {
    dir: tempfile::TempDir,
    pub queue: Arc<MemoryQueue>,
    pub storage: Arc<MemoryObjectStore>,
    pub store: Arc<MemoryJobStore>,
    pub submitter: JobSubmitter,
    retry: RetryPolicy,
}

impl Cluster {
    pub fn new() -> Self {
        Self::with_retry(fast_retry(3))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Arc::new(MemoryNotifier::fan_out_to(queue.clone()));
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            submitter: JobSubmitter::new(store.clone(), notifier),
            queue,
            storage: Arc::new(MemoryObjectStore::new()),
            store,
            retry,
        }
    }

    /// Start a worker host whose workspace lives under `name`.
    pub fn host(&self, name: &str, behavior: StubBehavior) -> Host {
        let workspace_root = self.dir.path().join(name);
        let state = Arc::new(JobStateClient::new(self.store.clone(), self.retry.clone()));
        let workspace = Arc::new(WorkspaceManager::new(&workspace_root, self.storage.clone()));
        let executor = Arc::new(StubExecutor::new(behavior));
        let publisher = ResultPublisher::new(self.storage.clone(), state.clone(), workspace.clone());
        let processor = Arc::new(JobProcessor::new(
            workspace,
            state,
            executor.clone(),
            publisher,
            RESULTS_BUCKET,
            RESULT_PREFIX,
        ));
        let dispatcher = Dispatcher::new(
            self.queue.clone(),
            processor,
            4,
            10,
            Duration::ZERO,
        );
        Host {
            workspace_root,
            executor,
            dispatcher,
        }
    }

    /// Upload `VCF` to `<user_id>/<job_id>~<file_name>` and submit it.
    pub async fn submit(&self, job_id: &str, user_id: &str, file_name: &str) -> JobRequest {
        let key = format!("{user_id}/{job_id}~{file_name}");
        self.storage.put_object(INPUT_BUCKET, &key, VCF).await;
        self.submitter
            .submit(INPUT_BUCKET, &key)
            .await
            .expect("submit should succeed")
    }

    pub async fn record(&self, job_id: &str) -> JobRecord {
        self.store
            .get(job_id)
            .await
            .expect("store get")
            .expect("record exists")
    }

    pub async fn result_object(&self, name: &str) -> Option<Vec<u8>> {
        self.storage
            .object(RESULTS_BUCKET, &format!("{RESULT_PREFIX}/{name}"))
            .await
    }
}
