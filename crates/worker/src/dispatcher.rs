//! Queue dispatcher.
//!
//! Long-polls the request queue and processes each received message on
//! its own task, bounded by a semaphore. A message is deleted only when
//! its processing returned a [`ProcessOutcome`]; every error leaves it on
//! the queue for redelivery. Nothing a single message does can stop the
//! loop.
//!
//! [`Dispatcher::run`] reserves permits before each receive and asks for
//! no more messages than it holds permits, so a slow job never delays
//! receiving work for idle permits and no received message waits for one.

use std::sync::Arc;
use std::time::Duration;

use gas_core::queue::{QueueError, QueueMessage, RequestQueue};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::processor::{JobProcessor, ProcessError, ProcessOutcome};

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Counts for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub deleted: usize,
    pub kept: usize,
}

impl BatchSummary {
    fn record(&mut self, joined: Result<bool, JoinError>) {
        match joined {
            Ok(true) => self.deleted += 1,
            Ok(false) => self.kept += 1,
            Err(e) => {
                self.kept += 1;
                tracing::error!(error = %e, "Message task panicked");
            }
        }
    }
}

pub struct Dispatcher {
    queue: Arc<dyn RequestQueue>,
    processor: Arc<JobProcessor>,
    permits: Arc<Semaphore>,
    max_messages: i32,
    wait_time: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn RequestQueue>,
        processor: Arc<JobProcessor>,
        concurrency: usize,
        max_messages: i32,
        wait_time: Duration,
    ) -> Self {
        Self {
            queue,
            processor,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            max_messages,
            wait_time,
        }
    }

    /// Poll until `cancel` fires, then wait for every message already
    /// received to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            max_messages = self.max_messages,
            wait_secs = self.wait_time.as_secs(),
            concurrency = self.permits.available_permits(),
            "Dispatcher started",
        );

        let mut tasks = JoinSet::new();
        let mut totals = BatchSummary::default();

        loop {
            let Some(mut permits) = self.reserve(&mut tasks, &mut totals, &cancel).await else {
                break;
            };

            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(permits.len() as i32, self.wait_time) => received,
            };

            match received {
                Ok(messages) => {
                    totals.received += messages.len();
                    for message in messages {
                        self.spawn_handler(&mut tasks, message, permits.pop());
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive from request queue");
                    drop(permits);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "Dispatcher shutting down, draining in-flight messages");
        while let Some(joined) = tasks.join_next().await {
            totals.record(joined);
        }
        tracing::info!(
            received = totals.received,
            deleted = totals.deleted,
            kept = totals.kept,
            "Dispatcher stopped",
        );
    }

    /// Wait for at least one free permit, reaping finished tasks meanwhile,
    /// then take as many more as are free up to `max_messages`. `None`
    /// once cancelled.
    async fn reserve(
        &self,
        tasks: &mut JoinSet<bool>,
        totals: &mut BatchSummary,
        cancel: &CancellationToken,
    ) -> Option<Vec<OwnedSemaphorePermit>> {
        let first = loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => totals.record(joined),
                // The semaphore is never closed.
                permit = Arc::clone(&self.permits).acquire_owned() => break permit.ok()?,
            }
        };

        let wanted = self.max_messages.max(1) as usize;
        let mut permits = vec![first];
        while permits.len() < wanted {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permits.push(permit),
                Err(_) => break,
            }
        }
        Some(permits)
    }

    /// Receive one batch and process it.
    pub async fn poll_once(&self) -> Result<BatchSummary, QueueError> {
        let messages = self.queue.receive(self.max_messages, self.wait_time).await?;
        Ok(self.process_batch(messages).await)
    }

    /// Process `messages` concurrently and delete each one whose job
    /// reached an outcome.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchSummary {
        let mut summary = BatchSummary {
            received: messages.len(),
            ..BatchSummary::default()
        };
        let mut tasks = JoinSet::new();

        for message in messages {
            self.spawn_handler(&mut tasks, message, None);
        }
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        tracing::debug!(
            received = summary.received,
            deleted = summary.deleted,
            kept = summary.kept,
            "Batch processed",
        );
        summary
    }

    /// Handle `message` on its own task, holding `permit` or waiting for
    /// one.
    fn spawn_handler(
        &self,
        tasks: &mut JoinSet<bool>,
        message: QueueMessage,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let permits = Arc::clone(&self.permits);
        let processor = Arc::clone(&self.processor);
        let queue = Arc::clone(&self.queue);

        tasks.spawn(async move {
            let _permit = match permit {
                Some(permit) => Some(permit),
                None => permits.acquire_owned().await.ok(),
            };
            handle_message(processor.as_ref(), queue.as_ref(), &message).await
        });
    }
}

/// Process one message and delete it if appropriate. Returns whether the
/// message was deleted.
async fn handle_message(
    processor: &JobProcessor,
    queue: &dyn RequestQueue,
    message: &QueueMessage,
) -> bool {
    let message_id = message.message_id.as_str();

    match processor.process(message).await {
        Ok(outcome) => {
            log_outcome(message_id, &outcome);
            match queue.delete(&message.receipt_handle).await {
                Ok(()) => true,
                Err(e) => {
                    // The message comes back and its replay is a conflict.
                    tracing::warn!(message_id, job_id = outcome.job_id(), error = %e, "Failed to delete message");
                    false
                }
            }
        }
        Err(e) => {
            log_error(message_id, &e);
            false
        }
    }
}

fn log_outcome(message_id: &str, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Completed { job_id } => {
            tracing::info!(message_id, job_id = %job_id, "Job completed, message deleted");
        }
        ProcessOutcome::Failed { job_id } => {
            tracing::warn!(message_id, job_id = %job_id, "Job failed, message deleted");
        }
        ProcessOutcome::Conflict { job_id } => {
            tracing::info!(message_id, job_id = %job_id, "Job owned elsewhere, message deleted");
        }
    }
}

fn log_error(message_id: &str, error: &ProcessError) {
    match error {
        ProcessError::Invalid(e) => {
            tracing::warn!(message_id, error = %e, "Rejected malformed message");
        }
        ProcessError::InProgress { job_id } => {
            tracing::info!(message_id, job_id = %job_id, "Job still in progress on this host, message kept");
        }
        ProcessError::Staging(e) => {
            tracing::warn!(message_id, error = %e, "Staging failed, message kept for redelivery");
        }
        ProcessError::State(e) => {
            tracing::error!(message_id, error = %e, "Job store call failed, message kept for redelivery");
        }
        ProcessError::Publish(e) => {
            tracing::error!(message_id, error = %e, "Publish failed, job left running");
        }
        ProcessError::FailureUnrecorded { .. } => {
            tracing::error!(message_id, error = %error, "Job left running");
        }
    }
}

#[cfg(test)]
mod tests {
    use gas_core::envelope;
    use gas_core::job::{JobRecord, JobRequest, JobStatus};
    use gas_core::memory::{MemoryJobStore, MemoryObjectStore, MemoryQueue, StubBehavior, StubExecutor};
    use gas_core::retry::RetryPolicy;
    use gas_core::store::{ConditionalWrite, JobStore};

    use super::*;
    use crate::publisher::ResultPublisher;
    use crate::state::JobStateClient;
    use crate::workspace::WorkspaceManager;

    struct Fixture {
        _dir: tempfile::TempDir,
        queue: Arc<MemoryQueue>,
        storage: Arc<MemoryObjectStore>,
        store: Arc<MemoryJobStore>,
        dispatcher: Dispatcher,
    }

    fn request(job_id: &str) -> JobRequest {
        JobRequest {
            job_id: job_id.into(),
            user_id: "u1".into(),
            input_file_name: "sample.vcf".into(),
            input_bucket: "in-bucket".into(),
            input_object_key: format!("u1/{job_id}~sample.vcf"),
        }
    }

    async fn fixture(job_ids: &[&str]) -> Fixture {
        fixture_with(job_ids, Arc::new(StubExecutor::new(StubBehavior::Succeed))).await
    }

    async fn fixture_with(job_ids: &[&str], executor: Arc<StubExecutor>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(MemoryQueue::new());
        let storage = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(MemoryJobStore::new());

        for job_id in job_ids {
            let req = request(job_id);
            storage.put_object(&req.input_bucket, &req.input_object_key, "chr1\t1\n").await;
            let write = ConditionalWrite::create(JobRecord::pending(&req, 1)).unwrap();
            store.conditional_put(job_id, write).await.unwrap();
        }

        let state = Arc::new(JobStateClient::new(store.clone(), RetryPolicy::no_retry()));
        let workspace = Arc::new(WorkspaceManager::new(dir.path(), storage.clone()));
        let publisher = ResultPublisher::new(storage.clone(), state.clone(), workspace.clone());
        let processor = Arc::new(JobProcessor::new(workspace, state, executor, publisher, "results", ""));
        let dispatcher = Dispatcher::new(queue.clone(), processor, 2, 10, Duration::from_millis(10));

        Fixture {
            _dir: dir,
            queue,
            storage,
            store,
            dispatcher,
        }
    }

    async fn status(store: &MemoryJobStore, job_id: &str) -> JobStatus {
        store.get(job_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn batch_deletes_finished_messages_and_keeps_bad_ones() {
        let fx = fixture(&["j1", "j2"]).await;
        let good_1 = fx.queue.push(envelope::wrap_notification(&request("j1")).unwrap()).await;
        fx.queue.push("{not json").await;
        let good_2 = fx.queue.push(envelope::wrap_notification(&request("j2")).unwrap()).await;

        let summary = fx.dispatcher.poll_once().await.unwrap();

        assert_eq!(summary, BatchSummary { received: 3, deleted: 2, kept: 1 });
        let mut deleted = fx.queue.deleted().await;
        deleted.sort();
        assert_eq!(deleted, vec![good_1, good_2]);
        assert_eq!(fx.queue.in_flight_len().await, 1);
        assert_eq!(status(&fx.store, "j1").await, JobStatus::Completed);
        assert_eq!(status(&fx.store, "j2").await, JobStatus::Completed);
    }

    #[tokio::test]
    async fn empty_poll_is_an_empty_summary() {
        let fx = fixture(&[]).await;
        assert_eq!(fx.dispatcher.poll_once().await.unwrap(), BatchSummary::default());
    }

    #[tokio::test]
    async fn run_processes_until_cancelled() {
        let fx = fixture(&["j1"]).await;
        fx.queue.push(envelope::wrap_notification(&request("j1")).unwrap()).await;

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let store = fx.store.clone();
        let watcher = tokio::spawn(async move {
            while status(&store, "j1").await != JobStatus::Completed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(10), fx.dispatcher.run(cancel))
            .await
            .expect("dispatcher should stop after cancellation");
        watcher.await.unwrap();

        assert_eq!(fx.queue.deleted().await.len(), 1);
        assert_eq!(fx.storage.upload_count(), 2);
    }

    #[tokio::test]
    async fn slow_job_does_not_block_receiving_the_next_message() {
        let executor = Arc::new(StubExecutor::gated(StubBehavior::Succeed));
        let fx = fixture_with(&["slow", "j2"], executor.clone()).await;
        fx.queue.push(envelope::wrap_notification(&request("slow")).unwrap()).await;

        let cancel = CancellationToken::new();
        let driver = async {
            executor.wait_started().await;
            fx.queue.push(envelope::wrap_notification(&request("j2")).unwrap()).await;
            executor.wait_started().await;

            assert_eq!(status(&fx.store, "slow").await, JobStatus::Running);
            assert_eq!(status(&fx.store, "j2").await, JobStatus::Running);

            executor.release(2);
            while status(&fx.store, "slow").await != JobStatus::Completed
                || status(&fx.store, "j2").await != JobStatus::Completed
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(fx.dispatcher.run(cancel.clone()), driver);
        })
        .await
        .expect("second message should be received while the first is running");

        assert_eq!(fx.queue.deleted().await.len(), 2);
    }

    #[tokio::test]
    async fn cancel_waits_for_in_flight_messages() {
        let executor = Arc::new(StubExecutor::gated(StubBehavior::Succeed));
        let fx = fixture_with(&["j1"], executor.clone()).await;
        fx.queue.push(envelope::wrap_notification(&request("j1")).unwrap()).await;

        let cancel = CancellationToken::new();
        let driver = async {
            executor.wait_started().await;
            cancel.cancel();
            tokio::time::sleep(Duration::from_millis(20)).await;
            executor.release(1);
        };

        tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(fx.dispatcher.run(cancel.clone()), driver);
        })
        .await
        .expect("dispatcher should stop once the in-flight message finishes");

        assert_eq!(status(&fx.store, "j1").await, JobStatus::Completed);
        assert_eq!(fx.queue.deleted().await.len(), 1);
    }
}
