//! Child-process executor for the annotation tool.
//!
//! Runs `<program> [args...] <input path>` with the input's directory as
//! the working directory, then checks that both artifacts were written
//! beside the input.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::executor::{Executor, PipelineError, PipelineRun};
use super::subprocess;
use crate::naming;

/// Characters of stderr kept in a failure diagnostic.
const STDERR_TAIL_CHARS: usize = 2000;

/// Executor that invokes the external annotation tool.
#[derive(Debug, Clone)]
pub struct AnnotatorExecutor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl AnnotatorExecutor {
    /// `args` are passed before the input path, e.g. `["run.py"]` with a
    /// `python` program.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Executor for AnnotatorExecutor {
    async fn run(&self, input: &Path) -> Result<PipelineRun, PipelineError> {
        let (result_path, log_path) = naming::artifact_paths(input)
            .map_err(|e| PipelineError::IoError(std::io::Error::new(ErrorKind::InvalidInput, e.to_string())))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(input);
        if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            program = %self.program.display(),
            input = %input.display(),
            timeout_secs = self.timeout.as_secs(),
            "Starting annotation pipeline",
        );

        let output = subprocess::run_command(&mut cmd, self.timeout)
            .await
            .map_err(|e| match e {
                PipelineError::IoError(io) if io.kind() == ErrorKind::NotFound => {
                    PipelineError::NotFound(self.program.display().to_string())
                }
                other => other,
            })?;

        if !output.success() {
            return Err(PipelineError::ExecutionFailed {
                exit_code: output.exit_code,
                stderr: subprocess::tail(&output.stderr, STDERR_TAIL_CHARS),
            });
        }

        for artifact in [&result_path, &log_path] {
            let exists = tokio::fs::try_exists(artifact)
                .await
                .map_err(PipelineError::IoError)?;
            if !exists {
                return Err(PipelineError::missing_output(artifact));
            }
        }

        Ok(PipelineRun {
            result_path,
            log_path,
            elapsed: output.elapsed,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
