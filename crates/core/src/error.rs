//! Crate-level error type.

use std::error::Error as _;
use thiserror::Error;

use crate::condor::CondorError;
use crate::events::EntityKind;
use crate::store::StoreError;

/// Longest short status message stored on a failed entity.
pub const SUMMARY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum CorralError {
    /// A request was rejected before any event or store call.
    #[error("{0}")]
    Validation(String),

    /// An install, uninstall or pilot job could not be submitted or cancelled.
    #[error("{context}")]
    Submission {
        context: String,
        #[source]
        source: CondorError,
    },

    /// Reattaching to an entity after restart failed.
    #[error("{0}")]
    Recovery(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("{0}")]
    InvalidState(String),

    #[error("No credential stored for {kind} {id}")]
    MissingCredential { kind: EntityKind, id: i64 },

    #[error("Orchestrator is not running")]
    NotRunning,

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CorralError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn submission(context: impl Into<String>, source: CondorError) -> Self {
        Self::Submission {
            context: context.into(),
            source,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short status message: the first line of the error, cut to [`SUMMARY_LEN`].
    pub fn summary(&self) -> String {
        summarize(&self.to_string())
    }

    /// Long status message: the error, every source and any captured command output.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        if let Self::Submission { source, .. } = self {
            if let Some(output) = source.command_output() {
                detail.push('\n');
                detail.push_str(&output);
            }
        }
        detail
    }
}

impl From<StoreError> for CorralError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store(other),
        }
    }
}

impl From<CondorError> for CorralError {
    fn from(source: CondorError) -> Self {
        Self::Submission {
            context: "Batch job error".to_string(),
            source,
        }
    }
}

/// First line of `message`, at most [`SUMMARY_LEN`] characters.
pub fn summarize(message: &str) -> String {
    let first = message.lines().next().unwrap_or("").trim();
    if first.chars().count() <= SUMMARY_LEN {
        return first.to_string();
    }
    first.chars().take(SUMMARY_LEN).collect()
}
