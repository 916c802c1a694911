//! Per-message job processing.
//!
//! One message runs strictly in order: parse, stage, claim, execute,
//! publish. The returned [`ProcessOutcome`] means the job reached a state
//! the message no longer has to drive, so the message may be deleted. A
//! [`ProcessError`] means the message must stay on the queue.
//!
//! | Step failure                       | Job state        | Message  |
//! |------------------------------------|------------------|----------|
//! | malformed body                     | untouched        | kept     |
//! | job in progress on this host       | untouched        | kept     |
//! | staging                            | untouched        | kept     |
//! | claim conflict                     | owned elsewhere  | deleted  |
//! | store unavailable after retries    | unchanged        | kept     |
//! | pipeline failure, FAILED recorded  | FAILED           | deleted  |
//! | pipeline failure, FAILED not saved | RUNNING          | kept     |
//! | upload failure                     | RUNNING          | kept     |
//!
//! A redelivered message for a RUNNING job publishes again only when this
//! host holds the `.done` marker of a successful run. Artifacts without it
//! come from a run that is still going or that failed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use gas_core::envelope;
use gas_core::error::CoreError;
use gas_core::job::{JobRequest, JobStatus};
use gas_core::pipeline::{Executor, PipelineError};
use gas_core::queue::QueueMessage;
use gas_core::store::WriteOutcome;

use crate::publisher::{PublishError, PublishOutcome, ResultPublisher};
use crate::state::{JobStateClient, StateError};
use crate::workspace::{JobFiles, StagingError, WorkspaceManager};

/// Terminal handling of a message; the message can be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { job_id: String },
    Failed { job_id: String },
    /// Another delivery owns the job or it is already finished.
    Conflict { job_id: String },
}

impl ProcessOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed { job_id } | Self::Failed { job_id } | Self::Conflict { job_id } => {
                job_id
            }
        }
    }
}

/// Processing stopped before the job reached a recorded outcome; the
/// message stays on the queue for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Invalid job request: {0}")]
    Invalid(#[from] CoreError),

    #[error("Job {job_id} is already being processed on this host")]
    InProgress { job_id: String },

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Pipeline failed ({pipeline}) and the failure could not be recorded: {state}")]
    FailureUnrecorded {
        pipeline: PipelineError,
        state: StateError,
    },
}

pub struct JobProcessor {
    workspace: Arc<WorkspaceManager>,
    state: Arc<JobStateClient>,
    executor: Arc<dyn Executor>,
    publisher: ResultPublisher,
    results_bucket: String,
    result_prefix: String,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a job as in progress on this host until dropped.
struct InFlightGuard<'a> {
    jobs: &'a Mutex<HashSet<String>>,
    job_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl JobProcessor {
    pub fn new(
        workspace: Arc<WorkspaceManager>,
        state: Arc<JobStateClient>,
        executor: Arc<dyn Executor>,
        publisher: ResultPublisher,
        results_bucket: impl Into<String>,
        result_prefix: impl Into<String>,
    ) -> Self {
        Self {
            workspace,
            state,
            executor,
            publisher,
            results_bucket: results_bucket.into(),
            result_prefix: result_prefix.into(),
            in_flight: Mutex::default(),
        }
    }

    /// Register `job_id` as in progress, or `None` if it already is.
    fn begin(&self, job_id: &str) -> Option<InFlightGuard<'_>> {
        let mut jobs = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job_id.to_string()).then(|| InFlightGuard {
            jobs: &self.in_flight,
            job_id: job_id.to_string(),
        })
    }

    /// Drive the job in `message` as far as it can go.
    pub async fn process(&self, message: &QueueMessage) -> Result<ProcessOutcome, ProcessError> {
        let request = envelope::parse_job_request(&message.body)?;
        let job_id = request.job_id.as_str();

        // A redelivery that overtook its own run must not touch the files.
        let Some(_guard) = self.begin(job_id) else {
            return Err(ProcessError::InProgress {
                job_id: job_id.to_string(),
            });
        };

        let input = self
            .workspace
            .stage(
                job_id,
                &request.user_id,
                &request.input_file_name,
                &request.input_bucket,
                &request.input_object_key,
            )
            .await?;
        let files = JobFiles::for_input(&input)?;

        match self.state.claim(job_id).await? {
            WriteOutcome::Applied => {
                tracing::info!(job_id, user_id = %request.user_id, "Job claimed");
            }
            WriteOutcome::Conflict => return self.on_claim_conflict(&request, &files).await,
        }

        match self.executor.run(&input).await {
            Ok(run) => {
                tracing::info!(job_id, elapsed_secs = run.elapsed_secs(), "Pipeline finished");
                let files = JobFiles {
                    result: run.result_path,
                    log: run.log_path,
                    ..files
                };
                if let Err(e) = files.mark_run_succeeded().await {
                    tracing::warn!(job_id, error = %e, "Failed to write run marker, publish will not be retried");
                }
                self.publish(&request, &files).await
            }
            Err(e) => self.record_failure(job_id, e).await,
        }
    }

    async fn publish(
        &self,
        request: &JobRequest,
        files: &JobFiles,
    ) -> Result<ProcessOutcome, ProcessError> {
        let job_id = request.job_id.clone();
        match self
            .publisher
            .publish(
                &request.job_id,
                &request.user_id,
                files,
                &self.results_bucket,
                &self.result_prefix,
            )
            .await?
        {
            PublishOutcome::Completed(_) => Ok(ProcessOutcome::Completed { job_id }),
            PublishOutcome::Conflict => Ok(ProcessOutcome::Conflict { job_id }),
        }
    }

    /// Another delivery claimed the job first. If that delivery's pipeline
    /// succeeded here but publishing failed, the artifacts are still staged
    /// and publishing can be retried without rerunning the pipeline.
    async fn on_claim_conflict(
        &self,
        request: &JobRequest,
        files: &JobFiles,
    ) -> Result<ProcessOutcome, ProcessError> {
        let job_id = request.job_id.as_str();
        let status = self.state.get(job_id).await?.map(|r| r.status);
        let succeeded = files.run_succeeded().await;

        match status {
            Some(JobStatus::Running) if succeeded => {
                tracing::info!(job_id, "Job still running after a successful run, retrying publish");
                self.publish(request, files).await
            }
            Some(JobStatus::Completed) => {
                // The input was just restaged for a job whose files are gone.
                self.workspace
                    .cleanup(&request.user_id, &[file_name(&files.input)])
                    .await;
                tracing::info!(job_id, "Job already completed, duplicate delivery dropped");
                Ok(ProcessOutcome::Conflict {
                    job_id: job_id.to_string(),
                })
            }
            status => {
                tracing::info!(job_id, status = ?status, "Job already claimed, skipping");
                Ok(ProcessOutcome::Conflict {
                    job_id: job_id.to_string(),
                })
            }
        }
    }

    async fn record_failure(
        &self,
        job_id: &str,
        error: PipelineError,
    ) -> Result<ProcessOutcome, ProcessError> {
        tracing::warn!(job_id, error = %error, "Pipeline failed");

        match self.state.fail(job_id, &error.to_string()).await {
            Ok(WriteOutcome::Applied) => {
                tracing::info!(job_id, "Job marked failed, workspace files kept");
                Ok(ProcessOutcome::Failed {
                    job_id: job_id.to_string(),
                })
            }
            Ok(WriteOutcome::Conflict) => Ok(ProcessOutcome::Conflict {
                job_id: job_id.to_string(),
            }),
            Err(state) => Err(ProcessError::FailureUnrecorded {
                pipeline: error,
                state,
            }),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
