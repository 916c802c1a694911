//! File and object-key naming conventions.
//!
//! A job's local files all share the job file name `<job_id>~<file_name>`:
//!
//! | File         | Name                              |
//! |--------------|-----------------------------------|
//! | staged input | `abc123~sample.vcf`               |
//! | result       | `abc123~sample.annot.vcf`         |
//! | log          | `abc123~sample.count.log`         |
//! | run marker   | `abc123~sample.done`              |
//!
//! Input objects live at `<prefix>/<user_id>/<job_id>~<file_name>`; result
//! objects at `<result_prefix>/<artifact file name>`.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Separator between the job id and the original file name.
pub const JOB_NAME_SEPARATOR: char = '~';

/// Suffix of the annotated result file.
pub const RESULT_SUFFIX: &str = ".annot.vcf";

/// Suffix of the pipeline log file.
pub const LOG_SUFFIX: &str = ".count.log";

/// Suffix of the marker written once the pipeline has succeeded.
pub const DONE_SUFFIX: &str = ".done";

/// `<job_id>~<file_name>`.
pub fn job_file_name(job_id: &str, file_name: &str) -> String {
    format!("{job_id}{JOB_NAME_SEPARATOR}{file_name}")
}

/// The artifact base name: the job file name up to its first `.`.
pub fn artifact_base(job_file_name: &str) -> &str {
    job_file_name
        .split_once('.')
        .map_or(job_file_name, |(base, _)| base)
}

/// `<base>.annot.vcf`
pub fn result_file_name(job_file_name: &str) -> String {
    format!("{}{RESULT_SUFFIX}", artifact_base(job_file_name))
}

/// `<base>.count.log`
pub fn log_file_name(job_file_name: &str) -> String {
    format!("{}{LOG_SUFFIX}", artifact_base(job_file_name))
}

/// `<base>.done`
pub fn done_file_name(job_file_name: &str) -> String {
    format!("{}{DONE_SUFFIX}", artifact_base(job_file_name))
}

/// Paths of the result and log files the pipeline writes beside `input`.
pub fn artifact_paths(input: &Path) -> Result<(PathBuf, PathBuf), CoreError> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            CoreError::Validation(format!("Input path has no file name: {}", input.display()))
        })?;
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    Ok((dir.join(result_file_name(name)), dir.join(log_file_name(name))))
}

/// Join an optional key prefix and a name with a single `/`.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// `<prefix>/<user_id>/<job_id>~<file_name>`.
pub fn input_object_key(prefix: &str, user_id: &str, job_id: &str, file_name: &str) -> String {
    object_key(&object_key(prefix, user_id), &job_file_name(job_id, file_name))
}

/// Components recovered from an input object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputKeyParts {
    pub user_id: String,
    pub job_id: String,
    pub file_name: String,
}

/// Split an input object key into user id, job id, and file name.
///
/// The last segment must be `<job_id>~<file_name>` and the segment before
/// it is the user id.
pub fn parse_input_object_key(key: &str) -> Result<InputKeyParts, CoreError> {
    let mut segments = key.rsplit('/');
    let job_name = segments.next().unwrap_or_default();
    let user_id = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("Input key '{key}' has no user segment")))?;

    let (job_id, file_name) = job_name
        .split_once(JOB_NAME_SEPARATOR)
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Input key '{key}' does not end in <job_id>{JOB_NAME_SEPARATOR}<file_name>"
            ))
        })?;

    Ok(InputKeyParts {
        user_id: user_id.to_string(),
        job_id: job_id.to_string(),
        file_name: file_name.to_string(),
    })
}
