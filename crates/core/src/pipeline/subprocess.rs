//! Child process management for the pipeline.
//!
//! [`run_command`] spawns a prepared [`tokio::process::Command`], captures
//! stdout/stderr, and enforces a wall-clock timeout. On timeout the child
//! is killed.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::executor::PipelineError;

/// Maximum stdout or stderr size captured per stream (1 MiB).
///
/// The pipeline writes its real output to files; anything beyond this on
/// the standard streams is read and discarded, never left in the pipe.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Captured output of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn `cmd`, wait for it to exit, and capture its output.
///
/// The caller sets the program, arguments, and working directory.
pub async fn run_command(cmd: &mut Command, timeout: Duration) -> Result<CommandOutput, PipelineError> {
    // `kill_on_drop(true)` kills the child when it is dropped on timeout.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();

    let mut child = cmd.spawn().map_err(PipelineError::IoError)?;

    // Read the streams in spawned tasks so `child.wait()` can borrow
    // `&mut child` concurrently.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = tokio::time::timeout(timeout, child.wait()).await;

    match wait_result {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();

            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                elapsed: start.elapsed(),
            })
        }
        Ok(Err(e)) => Err(PipelineError::IoError(e)),
        Err(_elapsed) => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to kill timed-out pipeline process");
            }
            // Reap the child so it does not linger as a zombie.
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(PipelineError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Keep at most the last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim().to_string();
    }
    text.chars().skip(count - max_chars).collect::<String>().trim().to_string()
}

/// Read an output stream to EOF, keeping the first [`MAX_OUTPUT_BYTES`].
///
/// The rest is drained into a sink so the child never blocks on, or dies
/// writing to, a full or closed pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo hello; echo oops >&2; exit 3");

        let output = run_command(&mut cmd, Duration::from_secs(5)).await.unwrap();

        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn kills_process_after_timeout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30");

        let started = Instant::now();
        let result = run_command(&mut cmd, Duration::from_millis(200)).await;

        assert_matches!(result, Err(PipelineError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let mut cmd = Command::new("/nonexistent/anntools");
        let result = run_command(&mut cmd, Duration::from_secs(1)).await;
        assert_matches!(result, Err(PipelineError::IoError(_)));
    }

    #[tokio::test]
    async fn output_past_the_cap_is_drained_not_cut() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("i=0; while [ $i -lt 3000 ]; do printf '%01000d\\n' 0; i=$((i+1)); done; exit 0");

        let output = run_command(&mut cmd, Duration::from_secs(30)).await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.len(), MAX_OUTPUT_BYTES);
    }

    #[test]
    fn tail_keeps_last_characters() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdefghij", 4), "ghij");
    }
}
