//! Worker configuration loaded from environment variables.
//!
//! | Env Var                 | Required | Default   |
//! |-------------------------|----------|-----------|
//! | `AWS_REGION_NAME`       | no       | SDK chain |
//! | `REQUEST_QUEUE_URL`     | yes      | --        |
//! | `RESULTS_BUCKET`        | yes      | --        |
//! | `RESULT_PREFIX`         | no       | (empty)   |
//! | `DATABASE_URL`          | yes      | --        |
//! | `WORKSPACE_ROOT`        | no       | `./jobs`  |
//! | `QUEUE_MAX_MESSAGES`    | no       | `10`      |
//! | `QUEUE_WAIT_TIME_SECS`  | no       | `20`      |
//! | `WORKER_CONCURRENCY`    | no       | `4`       |
//! | `ANNOTATOR_PROGRAM`     | yes      | --        |
//! | `ANNOTATOR_ARGS`        | no       | (none)    |
//! | `PIPELINE_TIMEOUT_SECS` | no       | `3600`    |
//! | `STORE_RETRY_ATTEMPTS`  | no       | `3`       |
//! | `STORE_RETRY_BASE_MS`   | no       | `200`     |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gas_core::retry::RetryPolicy;

const DEFAULT_WORKSPACE_ROOT: &str = "./jobs";
const DEFAULT_MAX_MESSAGES: i32 = 10;
const DEFAULT_WAIT_TIME_SECS: u64 = 20;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_STORE_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_STORE_RETRY_BASE_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the worker needs, built once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Overrides the SDK's region chain when set.
    pub region: Option<String>,
    pub queue_url: String,
    pub results_bucket: String,
    /// Key prefix for uploaded artifacts; empty for the bucket root.
    pub result_prefix: String,
    pub database_url: String,
    pub workspace_root: PathBuf,
    /// Messages requested per receive call (1..=10).
    pub max_messages: i32,
    /// Long-poll wait per receive call (0..=20s).
    pub wait_time: Duration,
    /// Messages processed in parallel.
    pub concurrency: usize,
    pub annotator_program: PathBuf,
    /// Arguments placed before the input path.
    pub annotator_args: Vec<String>,
    pub pipeline_timeout: Duration,
    pub store_retry: RetryPolicy,
}

impl WorkerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variables. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let max_messages = parse_or(&get, "QUEUE_MAX_MESSAGES", DEFAULT_MAX_MESSAGES)?;
        if !(1..=10).contains(&max_messages) {
            return Err(out_of_range("QUEUE_MAX_MESSAGES", max_messages, "must be 1..=10"));
        }

        let wait_secs = parse_or(&get, "QUEUE_WAIT_TIME_SECS", DEFAULT_WAIT_TIME_SECS)?;
        if wait_secs > 20 {
            return Err(out_of_range("QUEUE_WAIT_TIME_SECS", wait_secs, "must be 0..=20"));
        }

        let concurrency = parse_or(&get, "WORKER_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(out_of_range("WORKER_CONCURRENCY", concurrency, "must be at least 1"));
        }

        let timeout_secs = parse_or(&get, "PIPELINE_TIMEOUT_SECS", DEFAULT_PIPELINE_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(out_of_range("PIPELINE_TIMEOUT_SECS", timeout_secs, "must be at least 1"));
        }

        let retry_attempts = parse_or(&get, "STORE_RETRY_ATTEMPTS", DEFAULT_STORE_RETRY_ATTEMPTS)?;
        if retry_attempts == 0 {
            return Err(out_of_range("STORE_RETRY_ATTEMPTS", retry_attempts, "must be at least 1"));
        }
        let retry_base_ms = parse_or(&get, "STORE_RETRY_BASE_MS", DEFAULT_STORE_RETRY_BASE_MS)?;

        Ok(Self {
            region: get("AWS_REGION_NAME"),
            queue_url: required("REQUEST_QUEUE_URL")?,
            results_bucket: required("RESULTS_BUCKET")?,
            result_prefix: get("RESULT_PREFIX").unwrap_or_default(),
            database_url: required("DATABASE_URL")?,
            workspace_root: get("WORKSPACE_ROOT")
                .unwrap_or_else(|| DEFAULT_WORKSPACE_ROOT.to_string())
                .into(),
            max_messages,
            wait_time: Duration::from_secs(wait_secs),
            concurrency,
            annotator_program: required("ANNOTATOR_PROGRAM")?.into(),
            annotator_args: get("ANNOTATOR_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            pipeline_timeout: Duration::from_secs(timeout_secs),
            store_retry: RetryPolicy {
                max_attempts: retry_attempts,
                initial_delay: Duration::from_millis(retry_base_ms),
                ..RetryPolicy::default()
            },
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn out_of_range(var: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
