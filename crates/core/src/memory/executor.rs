use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use crate::naming;
use crate::pipeline::{Executor, PipelineError, PipelineRun};

/// What a [`StubExecutor`] does when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Write both artifacts and succeed.
    Succeed,
    /// Exit with this non-zero code and write nothing.
    Exit(i32),
    /// Write both artifacts, then exit with this non-zero code.
    FailAfterWriting(i32),
    /// Write the result file but not the log, then exit cleanly.
    OmitLog,
    /// Behave as if the process was killed on timeout.
    TimeOut,
}

/// Holds gated runs between writing their files and returning.
struct Gate {
    started: Semaphore,
    release: Semaphore,
}

/// An [`Executor`] that never spawns a process.
///
/// On success the result file is the input prefixed with a header line and
/// the log holds the input's line count, so artifact contents are a pure
/// function of the input.
pub struct StubExecutor {
    behavior: StubBehavior,
    gate: Option<Gate>,
    invocations: Mutex<Vec<PathBuf>>,
}

impl StubExecutor {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            gate: None,
            invocations: Mutex::default(),
        }
    }

    /// An executor whose runs block after writing their files until
    /// [`release`](Self::release) lets them return.
    pub fn gated(behavior: StubBehavior) -> Self {
        Self {
            gate: Some(Gate {
                started: Semaphore::new(0),
                release: Semaphore::new(0),
            }),
            ..Self::new(behavior)
        }
    }

    /// Wait until one more gated run has written its files.
    pub async fn wait_started(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.started.acquire().await {
                permit.forget();
            }
        }
    }

    /// Let `runs` blocked runs return.
    pub fn release(&self, runs: usize) {
        if let Some(gate) = &self.gate {
            gate.release.add_permits(runs);
        }
    }

    /// Input paths the executor was run against, in order.
    pub async fn invocations(&self) -> Vec<PathBuf> {
        self.invocations.lock().await.clone()
    }

    async fn write_artifacts(
        &self,
        input: &Path,
        result_path: &Path,
        log_path: &Path,
    ) -> Result<(), PipelineError> {
        let fail = |code: i32| PipelineError::ExecutionFailed {
            exit_code: code,
            stderr: format!("stub pipeline exited with {code}"),
        };

        match self.behavior {
            StubBehavior::Exit(code) => return Err(fail(code)),
            StubBehavior::TimeOut => return Err(PipelineError::Timeout { elapsed_ms: 0 }),
            StubBehavior::Succeed | StubBehavior::FailAfterWriting(_) | StubBehavior::OmitLog => {}
        }

        let contents = tokio::fs::read_to_string(input)
            .await
            .map_err(PipelineError::IoError)?;
        tokio::fs::write(result_path, format!("##annotated\n{contents}"))
            .await
            .map_err(PipelineError::IoError)?;

        if self.behavior == StubBehavior::OmitLog {
            return Err(PipelineError::missing_output(log_path));
        }

        tokio::fs::write(log_path, format!("lines: {}\n", contents.lines().count()))
            .await
            .map_err(PipelineError::IoError)?;

        match self.behavior {
            StubBehavior::FailAfterWriting(code) => Err(fail(code)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn run(&self, input: &Path) -> Result<PipelineRun, PipelineError> {
        self.invocations.lock().await.push(input.to_path_buf());

        let (result_path, log_path) = naming::artifact_paths(input).map_err(|e| {
            PipelineError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
        })?;

        let outcome = self.write_artifacts(input, &result_path, &log_path).await;

        if let Some(gate) = &self.gate {
            gate.started.add_permits(1);
            if let Ok(permit) = gate.release.acquire().await {
                permit.forget();
            }
        }

        outcome.map(|()| PipelineRun {
            result_path,
            log_path,
            elapsed: Duration::from_millis(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn staged(dir: &Path) -> PathBuf {
        let input = dir.join("abc123~sample.vcf");
        std::fs::write(&input, "chr1\t1\n").unwrap();
        input
    }

    #[tokio::test]
    async fn fail_after_writing_leaves_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged(dir.path());

        let result = StubExecutor::new(StubBehavior::FailAfterWriting(1)).run(&input).await;

        assert_matches!(result, Err(PipelineError::ExecutionFailed { exit_code: 1, .. }));
        assert!(dir.path().join("abc123~sample.annot.vcf").exists());
        assert!(dir.path().join("abc123~sample.count.log").exists());
    }

    #[tokio::test]
    async fn gated_run_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged(dir.path());
        let executor = std::sync::Arc::new(StubExecutor::gated(StubBehavior::Succeed));

        let runner = executor.clone();
        let run = tokio::spawn(async move { runner.run(&input).await });
        executor.wait_started().await;
        assert!(!run.is_finished());

        executor.release(1);
        assert!(run.await.unwrap().is_ok());
    }
}
