//! Pipeline execution interface and shared types.
//!
//! Defines [`Executor`], the trait every pipeline runner implements,
//! along with [`PipelineRun`] and [`PipelineError`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// Artifacts and timing of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    /// Annotated result file (`<base>.annot.vcf`).
    pub result_path: PathBuf,
    /// Pipeline log file (`<base>.count.log`).
    pub log_path: PathBuf,
    /// Wall-clock time the child process ran for.
    pub elapsed: Duration,
}

impl PipelineRun {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Errors that can occur while running the pipeline.
///
/// All of them are job-logic failures: the job is moved to FAILED rather
/// than retried.
#[derive(Debug)]
pub enum PipelineError {
    /// The pipeline program was not found at the configured path.
    NotFound(String),
    /// The run exceeded its configured timeout and was killed.
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },
    /// The program ran but exited with a non-zero exit code.
    ExecutionFailed {
        /// Process exit code (`-1` if killed by signal).
        exit_code: i32,
        /// Tail of the captured stderr output.
        stderr: String,
    },
    /// The program exited cleanly but an expected artifact is absent.
    MissingOutput(PathBuf),
    /// An I/O error occurred while spawning or communicating with the process.
    IoError(std::io::Error),
}

impl PipelineError {
    pub fn missing_output(path: &Path) -> Self {
        Self::MissingOutput(path.to_path_buf())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Pipeline program not found: {path}"),
            Self::Timeout { elapsed_ms } => {
                write!(f, "Pipeline timed out after {elapsed_ms}ms")
            }
            Self::ExecutionFailed { exit_code, stderr } => {
                write!(f, "Pipeline failed with exit code {exit_code}: {stderr}")
            }
            Self::MissingOutput(path) => {
                write!(f, "Pipeline did not produce {}", path.display())
            }
            Self::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs the annotation pipeline against one staged input file.
///
/// On success both artifacts exist beside the input, named from the
/// input's base name (see [`crate::naming::artifact_paths`]).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, input: &Path) -> Result<PipelineRun, PipelineError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
