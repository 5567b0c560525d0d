//! Error types for the condor module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while submitting, cancelling or watching batch jobs.
#[derive(Debug, Error)]
pub enum CondorError {
    /// The submit or cancel command could not be started.
    #[error("Unable to run {command}: {source}")]
    CommandNotRun {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The submit command exited with a non-zero status.
    #[error("Submit failed with exit code {code:?}")]
    SubmitFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The submit command succeeded but printed no job id.
    #[error("Unable to parse job id from submit output")]
    UnparseableJobId { stdout: String },

    /// The cancel command exited with a non-zero status.
    #[error("Cancel of job {job_id} failed with exit code {code:?}")]
    CancelFailed {
        job_id: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A job operation needed a job id that was never recorded.
    #[error("No job id recorded in {dir}")]
    MissingJobId { dir: PathBuf },

    /// Unknown grid type string.
    #[error("Unrecognized grid type: {0}")]
    UnknownGridType(String),

    /// A job log record could not be parsed.
    #[error("Unable to parse job log record: {reason}")]
    LogParse { reason: String },

    /// I/O error on a job file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CondorError {
    /// Creates a log parse error.
    pub fn log_parse(reason: impl Into<String>) -> Self {
        Self::LogParse {
            reason: reason.into(),
        }
    }

    /// Output captured from the external command, if any.
    pub fn command_output(&self) -> Option<String> {
        match self {
            Self::SubmitFailed { stdout, stderr, .. } => {
                Some(format!("stdout:\n{}\nstderr:\n{}", stdout, stderr))
            }
            Self::UnparseableJobId { stdout } => Some(format!("stdout:\n{}", stdout)),
            Self::CancelFailed { stderr, .. } => Some(format!("stderr:\n{}", stderr)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_failed_display_and_output() {
        let err = CondorError::SubmitFailed {
            code: Some(1),
            stdout: "Submitting job(s)".to_string(),
            stderr: "ERROR: no such file".to_string(),
        };
        assert_eq!(err.to_string(), "Submit failed with exit code Some(1)");
        let output = err.command_output().unwrap();
        assert!(output.contains("ERROR: no such file"));
    }

    #[test]
    fn test_io_error_has_no_command_output() {
        let err = CondorError::from(std::io::Error::other("disk full"));
        assert!(err.command_output().is_none());
        assert!(err.to_string().contains("disk full"));
    }
}
